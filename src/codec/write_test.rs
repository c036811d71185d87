use std::collections::HashMap;
use std::sync::Arc;

use super::apply_write;
use super::decode_write_value;
use super::read_paths;
use super::WriteValue;
use crate::codec::read_test::as_json;
use crate::context::TelemetryContext;
use crate::proto::gnmi;
use crate::resolve::Resolver;
use crate::resolve::ValueShape;
use crate::test_utils::gnmi_path;
use crate::test_utils::gnmi_prefix;
use crate::test_utils::seed_counters_fixture;
use crate::Result;

async fn fixture() -> Result<(Arc<TelemetryContext>, Resolver)> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;
    let resolver = Resolver::new(ctx.clone());
    Ok((ctx, resolver))
}

fn json_val(json: &str) -> gnmi::TypedValue {
    gnmi::TypedValue {
        value: Some(gnmi::typed_value::Value::JsonIetfVal(json.as_bytes().to_vec())),
    }
}

fn string_val(s: &str) -> gnmi::TypedValue {
    gnmi::TypedValue {
        value: Some(gnmi::typed_value::Value::StringVal(s.to_string())),
    }
}

#[tokio::test]
async fn test_scalar_write_and_delete() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["PORT", "Ethernet0", "admin_status"]);

    let (location, shape) = resolver.resolve_write(Some(&prefix), &path).await?;
    assert_eq!(shape, ValueShape::Scalar);

    let value = decode_write_value(&location, Some(&string_val("down")), shape)?;
    apply_write(&ctx, &location, value).await?;
    let store = ctx.registry().connector("CONFIG_DB")?;
    assert_eq!(
        store.hget("PORT|Ethernet0", "admin_status").await?,
        Some("down".to_string())
    );

    // empty scalar deletes the field
    let value = decode_write_value(&location, Some(&string_val("")), shape)?;
    apply_write(&ctx, &location, value).await?;
    assert_eq!(store.hget("PORT|Ethernet0", "admin_status").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_field_map_reconcile() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let store = ctx.registry().connector("CONFIG_DB")?;
    store
        .hset("TELEMETRY_CLIENT|Global", "src_ip", "30.57.185.38")
        .await?;
    store
        .hset("TELEMETRY_CLIENT|Global", "retry_interval", "30")
        .await?;

    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["TELEMETRY_CLIENT", "Global"]);
    let (location, shape) = resolver.resolve_write(Some(&prefix), &path).await?;

    let value = decode_write_value(
        &location,
        Some(&json_val(r#"{"retry_interval":"5","encoding":"JSON_IETF"}"#)),
        shape,
    )?;
    apply_write(&ctx, &location, value).await?;

    // the stored hash now equals the desired map: src_ip gone, both
    // specified fields present
    let hash = store.hgetall("TELEMETRY_CLIENT|Global").await?;
    assert_eq!(hash.len(), 2);
    assert_eq!(hash["retry_interval"], "5");
    assert_eq!(hash["encoding"], "JSON_IETF");
    Ok(())
}

#[tokio::test]
async fn test_key_map_reconcile() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["VLAN"]);
    let (location, shape) = resolver.resolve_write(Some(&prefix), &path).await?;
    assert_eq!(shape, ValueShape::FieldOrKeyMap);

    let value = decode_write_value(
        &location,
        Some(&json_val(
            r#"{"Vlan100":{"vlanid":"100"},"Vlan200":{"vlanid":"200"}}"#,
        )),
        shape,
    )?;
    apply_write(&ctx, &location, value).await?;

    let store = ctx.registry().connector("CONFIG_DB")?;
    assert_eq!(
        store.hget("VLAN|Vlan100", "vlanid").await?,
        Some("100".to_string())
    );
    assert_eq!(
        store.hget("VLAN|Vlan200", "vlanid").await?,
        Some("200".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_shape_mismatch_rejected() -> Result<()> {
    let (_ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");

    // scalar where a map is declared
    let path = gnmi_path(&["TELEMETRY_CLIENT", "Global"]);
    let (location, shape) = resolver.resolve_write(Some(&prefix), &path).await?;
    assert!(decode_write_value(&location, Some(&string_val("x")), shape).is_err());

    // nested map where only a flat map is declared
    assert!(decode_write_value(
        &location,
        Some(&json_val(r#"{"Global":{"retry_interval":"5"}}"#)),
        shape
    )
    .is_err());
    Ok(())
}

#[tokio::test]
async fn test_delete_whole_key() -> Result<()> {
    let (ctx, resolver) = fixture().await?;
    let store = ctx.registry().connector("CONFIG_DB")?;
    store.hset("VLAN|Vlan100", "vlanid", "100").await?;
    store.hset("VLAN|Vlan100", "mtu", "9100").await?;

    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["VLAN", "Vlan100"]);
    let (location, shape) = resolver.resolve_write(Some(&prefix), &path).await?;

    let value = decode_write_value(&location, None, shape)?;
    assert_eq!(value, WriteValue::Delete);
    apply_write(&ctx, &location, value).await?;
    assert!(!store.exists("VLAN|Vlan100").await?);
    Ok(())
}

#[tokio::test]
async fn test_codec_roundtrip_read_write_read() -> Result<()> {
    // for a location without field: read; write the result back; read again
    // and require an identical map
    let (ctx, resolver) = fixture().await?;
    let prefix = gnmi_prefix("CONFIG_DB");
    let path = gnmi_path(&["TELEMETRY_CLIENT", "Global"]);

    let store = ctx.registry().connector("CONFIG_DB")?;
    store
        .hset("TELEMETRY_CLIENT|Global", "retry_interval", "30")
        .await?;
    store
        .hset("TELEMETRY_CLIENT|Global", "encoding", "JSON_IETF")
        .await?;

    let locations = resolver.resolve(Some(&prefix), &path).await?;
    let first = read_paths(&ctx, &locations).await?;
    let first_json = as_json(&first);

    let mut desired = HashMap::new();
    for (k, v) in first_json.as_object().unwrap() {
        desired.insert(k.clone(), v.as_str().unwrap().to_string());
    }
    let (write_loc, _) = resolver.resolve_write(Some(&prefix), &path).await?;
    apply_write(&ctx, &write_loc, WriteValue::Fields(desired)).await?;

    let second = read_paths(&ctx, &locations).await?;
    assert_eq!(as_json(&second), first_json);
    Ok(())
}
