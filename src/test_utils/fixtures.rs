use std::collections::HashMap;

use crate::proto::gnmi;
use crate::store::StoreRegistry;
use crate::Result;

/// Builds a request path from element names; no attributes, no target.
pub fn gnmi_path(elems: &[&str]) -> gnmi::Path {
    gnmi::Path {
        origin: String::new(),
        elem: elems
            .iter()
            .map(|name| gnmi::PathElem {
                name: name.to_string(),
                key: HashMap::new(),
            })
            .collect(),
        target: String::new(),
    }
}

/// Builds a prefix carrying only a target store name.
pub fn gnmi_prefix(target: &str) -> gnmi::Path {
    gnmi::Path {
        origin: String::new(),
        elem: Vec::new(),
        target: target.to_string(),
    }
}

pub const ETH0_OID: &str = "oid:0x1000000000002";
pub const ETH4_OID: &str = "oid:0x1000000000004";
pub const ETH68_OID: &str = "oid:0x1000000000039";

pub const ETH68_QUEUE1_OID: &str = "oid:0x15000000000a01";
pub const ETH68_QUEUE3_OID: &str = "oid:0x15000000000a03";
pub const ETH68_QUEUE4_OID: &str = "oid:0x15000000000a04";
pub const ETH0_QUEUE0_OID: &str = "oid:0x15000000000901";

/// Seeds the switch-shaped dataset the resolver and engine tests run over:
/// three interfaces with vendor aliases, their counter hashes, queue maps,
/// and a PFC watchdog enabled on Ethernet68 queues 3 and 4.
pub async fn seed_counters_fixture(registry: &StoreRegistry) -> Result<()> {
    let counters = registry.connector("COUNTERS_DB")?;
    let config = registry.connector("CONFIG_DB")?;

    for (port, oid) in [
        ("Ethernet0", ETH0_OID),
        ("Ethernet4", ETH4_OID),
        ("Ethernet68", ETH68_OID),
    ] {
        counters.hset("COUNTERS_PORT_NAME_MAP", port, oid).await?;
        config
            .hset(&format!("PORT|{port}"), "alias", &format!("{port}/1"))
            .await?;
        config
            .hset(&format!("PORT|{port}"), "admin_status", "up")
            .await?;
    }

    for (queue, oid) in [
        ("Ethernet68:1", ETH68_QUEUE1_OID),
        ("Ethernet68:3", ETH68_QUEUE3_OID),
        ("Ethernet68:4", ETH68_QUEUE4_OID),
        ("Ethernet0:0", ETH0_QUEUE0_OID),
    ] {
        counters.hset("COUNTERS_QUEUE_NAME_MAP", queue, oid).await?;
    }

    for (oid, pfc7) in [(ETH0_OID, "0"), (ETH4_OID, "1"), (ETH68_OID, "2")] {
        let key = format!("COUNTERS:{oid}");
        counters.hset(&key, "SAI_PORT_STAT_IF_IN_UCAST_PKTS", "4").await?;
        counters.hset(&key, "SAI_PORT_STAT_IF_OUT_ERRORS", "0").await?;
        counters.hset(&key, "SAI_PORT_STAT_PFC_3_RX_PKTS", "9").await?;
        counters.hset(&key, "SAI_PORT_STAT_PFC_4_RX_PKTS", "3").await?;
        counters.hset(&key, "SAI_PORT_STAT_PFC_7_RX_PKTS", pfc7).await?;
    }

    for oid in [ETH68_QUEUE1_OID, ETH68_QUEUE3_OID, ETH68_QUEUE4_OID] {
        let key = format!("COUNTERS:{oid}");
        counters
            .hset(&key, "SAI_QUEUE_STAT_PACKETS", "182")
            .await?;
        counters.hset(&key, "SAI_QUEUE_STAT_BYTES", "19700").await?;
        counters
            .hset(&key, "SAI_QUEUE_STAT_DROPPED_PACKETS", "0")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED", "0")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_TX_DROPPED_PACKETS", "0")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_RX_DROPPED_PACKETS", "0")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED", "0")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_TX_PACKETS", "182")
            .await?;
        counters
            .hset(&key, "PFC_WD_QUEUE_STATS_RX_PACKETS", "0")
            .await?;
        counters.hset(&key, "PFC_WD_STATUS", "operational").await?;
    }

    config
        .hset("PFC_WD_TABLE|Ethernet68", "action", "drop")
        .await?;
    config
        .hset("PFC_WD_TABLE|Ethernet68", "detection_time", "200")
        .await?;
    config
        .hset("PORT_QOS_MAP|Ethernet68", "pfc_enable", "3,4")
        .await?;
    config
        .hset("MAP_PFC_PRIORITY_TO_QUEUE|AZURE", "3", "3")
        .await?;
    config
        .hset("MAP_PFC_PRIORITY_TO_QUEUE|AZURE", "4", "4")
        .await?;

    Ok(())
}

/// The full counter hash the fixture stores for a port oid.
pub async fn fixture_port_hash(
    registry: &StoreRegistry,
    oid: &str,
) -> Result<HashMap<String, String>> {
    let counters = registry.connector("COUNTERS_DB")?;
    counters.hgetall(&format!("COUNTERS:{oid}")).await
}
