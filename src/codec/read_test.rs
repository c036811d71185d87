use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::read_paths;
use crate::context::TelemetryContext;
use crate::proto::gnmi;
use crate::resolve::Resolver;
use crate::test_utils::gnmi_path;
use crate::test_utils::gnmi_prefix;
use crate::test_utils::seed_counters_fixture;
use crate::Result;

pub(crate) fn as_json(val: &gnmi::TypedValue) -> JsonValue {
    match &val.value {
        Some(gnmi::typed_value::Value::JsonIetfVal(bytes)) => {
            serde_json::from_slice(bytes).expect("valid json payload")
        }
        other => panic!("expected json value, got {other:?}"),
    }
}

pub(crate) fn as_string(val: &gnmi::TypedValue) -> &str {
    match &val.value {
        Some(gnmi::typed_value::Value::StringVal(s)) => s,
        other => panic!("expected string value, got {other:?}"),
    }
}

async fn fixture() -> Result<(Arc<TelemetryContext>, Resolver)> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;
    let resolver = Resolver::new(ctx.clone());
    Ok((ctx, resolver))
}

#[tokio::test]
async fn test_scalar_leaf_read() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet68/1", "SAI_PORT_STAT_PFC_7_RX_PKTS"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    assert_eq!(as_string(&value), "2");
    Ok(())
}

#[tokio::test]
async fn test_wildcard_port_read_keyed_by_alias() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet*"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);

    let object = json.as_object().expect("top-level object");
    assert_eq!(object.len(), 3);
    assert!(object.contains_key("Ethernet68/1"));
    assert!(object.contains_key("Ethernet0/1"));
    assert_eq!(
        object["Ethernet68/1"]["SAI_PORT_STAT_PFC_7_RX_PKTS"],
        JsonValue::String("2".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_single_port_read_is_flat_hash() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet68"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);

    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    assert_eq!(json["SAI_PORT_STAT_IF_IN_UCAST_PKTS"], "4");
    Ok(())
}

#[tokio::test]
async fn test_field_pattern_prefix_anchored() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet68", "SAI_PORT_STAT_PFC_*"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);
    let object = json.as_object().unwrap();

    assert_eq!(object.len(), 3);
    assert!(object.keys().all(|k| k.starts_with("SAI_PORT_STAT_PFC_")));
    Ok(())
}

#[tokio::test]
async fn test_wildcard_port_with_field() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet*", "SAI_PORT_STAT_PFC_7_RX_PKTS"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);

    assert_eq!(json["Ethernet68/1"]["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    assert_eq!(json["Ethernet4/1"]["SAI_PORT_STAT_PFC_7_RX_PKTS"], "1");
    Ok(())
}

#[tokio::test]
async fn test_keyless_table_read_merges_under_suffix() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["PFC_WD_TABLE"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);

    assert_eq!(json["Ethernet68"]["action"], "drop");
    Ok(())
}

#[tokio::test]
async fn test_counters_map_read_at_root() -> Result<()> {
    // keyless table in the counters store: the table itself is the key
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS_PORT_NAME_MAP"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);

    assert_eq!(json["Ethernet68"], "oid:0x1000000000039");
    Ok(())
}

#[tokio::test]
async fn test_missing_explicit_field_is_error() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["PORT", "Ethernet0", "alias"]);
    let mut locations = resolver.resolve(Some(&prefix), &path).await?;

    // point the location at a field that does not exist
    if let crate::resolve::FieldSpec::Fields(fields) = &mut locations[0].fields {
        fields[0] = "no_such_field".to_string();
    }
    assert!(read_paths(&ctx, &locations).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_pfcwd_read_merges_queue_and_port_counters() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("COUNTERS_DB");
    let path = gnmi_path(&["COUNTERS", "Ethernet68", "Queue3", "Pfcwd"]);

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let value = read_paths(&ctx, &locations).await?;
    let json = as_json(&value);
    let object = json.as_object().unwrap();

    assert_eq!(object["PFC_WD_STATUS"], "operational");
    assert_eq!(object["SAI_PORT_STAT_PFC_3_RX_PKTS"], "9");
    assert_eq!(object.len(), 8);
    Ok(())
}
