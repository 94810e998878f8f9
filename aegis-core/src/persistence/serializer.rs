//! JSON codec with typed markers (C17), per SPEC_FULL §6's snapshot schema. Plain `serde` derives
//! already round-trip our own types within this process, but the schema exists so an external
//! reader without Rust's type system (the dashboard, a Python debugging shell, a human staring at
//! a row in the database) can still tell a bar's close time from an ordinary string and a position
//! record from an arbitrary object. The encoder is a small visitor over `serde_json::Value` that
//! recognizes in-domain shapes and tags them; the decoder is the symmetric visitor that rebuilds
//! typed values from the tags and rejects anything that doesn't carry the marker it expects.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::aggregates::instrument::{InstrumentAggregateSnapshot, SymbolStateSnapshot};
use crate::aggregates::position::{PositionAggregateSnapshot, PositionRecord, TrackedOrder};
use crate::core::{Bar, Direction, Offset, OrderStatus, VtOrderId, VtSymbol};

/// The only schema version this crate has ever written. Bumped only alongside an entry in
/// `migrations.rs`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Top-level persisted state, per SPEC_FULL §3/§6: `{schema_version, saved_at, target_aggregate,
/// position_aggregate, current_dt}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyStateSnapshot {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub target_aggregate: InstrumentAggregateSnapshot,
    pub position_aggregate: PositionAggregateSnapshot,
    pub current_dt: DateTime<Utc>,
}

fn custom(msg: impl Into<String>) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(msg.into())
}

// --- individual marker kinds -------------------------------------------------------------

fn mark_datetime(dt: DateTime<Utc>) -> Value {
    json!({ "__datetime__": dt.to_rfc3339() })
}

fn unmark_datetime(value: &Value) -> Result<DateTime<Utc>, serde_json::Error> {
    let raw = value
        .get("__datetime__")
        .and_then(Value::as_str)
        .ok_or_else(|| custom("expected a {\"__datetime__\": ...} marker"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| custom(format!("invalid __datetime__ value {raw:?}: {e}")))
}

fn mark_date(date: NaiveDate) -> Value {
    json!({ "__date__": date.format("%Y-%m-%d").to_string() })
}

fn unmark_date(value: &Value) -> Result<NaiveDate, serde_json::Error> {
    let raw = value
        .get("__date__")
        .and_then(Value::as_str)
        .ok_or_else(|| custom("expected a {\"__date__\": ...} marker"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| custom(format!("invalid __date__ value {raw:?}: {e}")))
}

fn mark_enum(class_name: &str, variant: &str) -> Value {
    json!({ "__enum__": format!("{class_name}.{variant}") })
}

fn unmark_enum<'a>(value: &'a Value, class_name: &str) -> Result<&'a str, serde_json::Error> {
    let raw = value
        .get("__enum__")
        .and_then(Value::as_str)
        .ok_or_else(|| custom("expected a {\"__enum__\": ...} marker"))?;
    raw.strip_prefix(class_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(|| custom(format!("enum marker {raw:?} is not a {class_name} variant")))
}

/// Wraps a collection with the `__set__` marker. No aggregate currently holding a snapshot carries
/// a native Rust set (symbol universes are map keys, not sets), so this has no call site in
/// [`encode_snapshot`] today — it exists, and is tested directly, so a future field that needs
/// set semantics (e.g. a blacklist of suspended symbols) has a ready-made encoding.
#[allow(dead_code)]
fn mark_set(values: Vec<Value>) -> Value {
    json!({ "__set__": true, "values": values })
}

#[allow(dead_code)]
fn unmark_set(value: &Value) -> Result<Vec<Value>, serde_json::Error> {
    if value.get("__set__").and_then(Value::as_bool) != Some(true) {
        return Err(custom("expected a {\"__set__\": true, ...} marker"));
    }
    value
        .get("values")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| custom("__set__ marker is missing its \"values\" array"))
}

fn mark_dataclass(class_name: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert("__dataclass__".to_string(), Value::String(class_name.to_string()));
    Value::Object(fields)
}

fn unmark_dataclass<'a>(value: &'a Value, class_name: &str) -> Result<&'a Map<String, Value>, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("expected a dataclass-marked object"))?;
    match obj.get("__dataclass__").and_then(Value::as_str) {
        Some(found) if found == class_name => Ok(obj),
        Some(found) => Err(custom(format!("expected __dataclass__ {class_name}, found {found}"))),
        None => Err(custom("object carries no __dataclass__ marker")),
    }
}

fn mark_dataframe(records: Vec<Value>) -> Value {
    json!({ "__dataframe__": true, "records": records })
}

fn unmark_dataframe(value: &Value) -> Result<Vec<Value>, serde_json::Error> {
    if value.get("__dataframe__").and_then(Value::as_bool) != Some(true) {
        return Err(custom("expected a {\"__dataframe__\": true, ...} marker"));
    }
    value
        .get("records")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| custom("__dataframe__ marker is missing its \"records\" array"))
}

fn decimal_to_value(d: Decimal) -> Value {
    Value::String(d.to_string())
}

fn decode_decimal(value: &Value) -> Result<Decimal, serde_json::Error> {
    value
        .as_str()
        .ok_or_else(|| custom("expected a decimal-as-string value"))?
        .parse()
        .map_err(|e| custom(format!("invalid decimal value: {e}")))
}

fn get<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, serde_json::Error> {
    obj.get(field).ok_or_else(|| custom(format!("missing field `{field}`")))
}

fn get_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, serde_json::Error> {
    get(obj, field)?.as_str().ok_or_else(|| custom(format!("field `{field}` is not a string")))
}

// --- Bar / dataframe ----------------------------------------------------------------------

fn encode_bar(bar: &Bar) -> Value {
    json!({
        "vt_symbol": bar.vt_symbol,
        "datetime": mark_datetime(bar.datetime),
        "interval_minutes": bar.interval_minutes,
        "open": decimal_to_value(bar.open),
        "high": decimal_to_value(bar.high),
        "low": decimal_to_value(bar.low),
        "close": decimal_to_value(bar.close),
        "volume": decimal_to_value(bar.volume),
        "open_interest": decimal_to_value(bar.open_interest),
    })
}

fn decode_bar(value: &Value) -> Result<Bar, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("bar record must be an object"))?;
    Ok(Bar {
        vt_symbol: get_str(obj, "vt_symbol")?.to_string(),
        datetime: unmark_datetime(get(obj, "datetime")?)?,
        interval_minutes: get(obj, "interval_minutes")?
            .as_u64()
            .ok_or_else(|| custom("interval_minutes must be an integer"))? as u32,
        open: decode_decimal(get(obj, "open")?)?,
        high: decode_decimal(get(obj, "high")?)?,
        low: decode_decimal(get(obj, "low")?)?,
        close: decode_decimal(get(obj, "close")?)?,
        volume: decode_decimal(get(obj, "volume")?)?,
        open_interest: decode_decimal(get(obj, "open_interest")?)?,
    })
}

// --- Instrument aggregate ------------------------------------------------------------------

fn encode_symbol_state(state: &SymbolStateSnapshot) -> Result<Value, serde_json::Error> {
    let records = state.bars.iter().map(encode_bar).collect();
    Ok(json!({
        "bars": mark_dataframe(records),
        "indicators": serde_json::to_value(&state.indicators)?,
    }))
}

fn decode_symbol_state(value: &Value) -> Result<SymbolStateSnapshot, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("symbol state must be an object"))?;
    let bars = unmark_dataframe(get(obj, "bars")?)?.iter().map(decode_bar).collect::<Result<Vec<_>, _>>()?;
    let indicators = serde_json::from_value(get(obj, "indicators")?.clone())?;
    Ok(SymbolStateSnapshot { bars, indicators })
}

fn encode_instrument_aggregate(agg: &InstrumentAggregateSnapshot) -> Result<Value, serde_json::Error> {
    let mut symbols = Map::new();
    for (symbol, state) in &agg.symbols {
        symbols.insert(symbol.clone(), encode_symbol_state(state)?);
    }
    Ok(json!({
        "ring_capacity": agg.ring_capacity,
        "symbols": Value::Object(symbols),
        "active_contracts": agg.active_contracts,
    }))
}

fn decode_instrument_aggregate(value: &Value) -> Result<InstrumentAggregateSnapshot, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("target_aggregate must be an object"))?;
    let ring_capacity = get(obj, "ring_capacity")?.as_u64().ok_or_else(|| custom("ring_capacity must be an integer"))? as usize;
    let symbols_obj = get(obj, "symbols")?.as_object().ok_or_else(|| custom("symbols must be an object"))?;
    let mut symbols = HashMap::new();
    for (symbol, state_value) in symbols_obj {
        symbols.insert(symbol.clone(), decode_symbol_state(state_value)?);
    }
    let active_contracts: HashMap<String, String> = serde_json::from_value(get(obj, "active_contracts")?.clone())?;
    Ok(InstrumentAggregateSnapshot { ring_capacity, symbols, active_contracts })
}

// --- Position aggregate --------------------------------------------------------------------

fn encode_direction(direction: Direction) -> Value {
    mark_enum("Direction", &direction.to_string())
}

fn decode_direction(value: &Value) -> Result<Direction, serde_json::Error> {
    match unmark_enum(value, "Direction")? {
        "LONG" => Ok(Direction::Long),
        "SHORT" => Ok(Direction::Short),
        other => Err(custom(format!("unknown Direction variant {other:?}"))),
    }
}

fn encode_offset(offset: Offset) -> Value {
    mark_enum("Offset", &offset.to_string())
}

fn decode_offset(value: &Value) -> Result<Offset, serde_json::Error> {
    match unmark_enum(value, "Offset")? {
        "OPEN" => Ok(Offset::Open),
        "CLOSE" => Ok(Offset::Close),
        "CLOSE_TODAY" => Ok(Offset::CloseToday),
        "CLOSE_YESTERDAY" => Ok(Offset::CloseYesterday),
        other => Err(custom(format!("unknown Offset variant {other:?}"))),
    }
}

fn encode_order_status(status: OrderStatus) -> Value {
    mark_enum("OrderStatus", &status.to_string())
}

fn decode_order_status(value: &Value) -> Result<OrderStatus, serde_json::Error> {
    match unmark_enum(value, "OrderStatus")? {
        "SUBMITTING" => Ok(OrderStatus::Submitting),
        "NOT_TRADED" => Ok(OrderStatus::NotTraded),
        "PART_TRADED" => Ok(OrderStatus::PartTraded),
        "ALL_TRADED" => Ok(OrderStatus::AllTraded),
        "CANCELLED" => Ok(OrderStatus::Cancelled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        other => Err(custom(format!("unknown OrderStatus variant {other:?}"))),
    }
}

fn encode_position_record(record: &PositionRecord) -> Value {
    let mut fields = Map::new();
    fields.insert("vt_symbol".to_string(), Value::String(record.vt_symbol.as_str().to_string()));
    fields.insert("direction".to_string(), encode_direction(record.direction));
    fields.insert("volume".to_string(), decimal_to_value(record.volume));
    fields.insert("pending_close_volume".to_string(), decimal_to_value(record.pending_close_volume));
    mark_dataclass("aegis_core.PositionRecord", fields)
}

fn decode_position_record(value: &Value) -> Result<PositionRecord, serde_json::Error> {
    let obj = unmark_dataclass(value, "aegis_core.PositionRecord")?;
    Ok(PositionRecord {
        vt_symbol: VtSymbol::new(get_str(obj, "vt_symbol")?),
        direction: decode_direction(get(obj, "direction")?)?,
        volume: decode_decimal(get(obj, "volume")?)?,
        pending_close_volume: decode_decimal(get(obj, "pending_close_volume")?)?,
    })
}

fn encode_tracked_order(order: &TrackedOrder) -> Value {
    let mut fields = Map::new();
    fields.insert("vt_orderid".to_string(), Value::String(order.vt_orderid.as_str().to_string()));
    fields.insert("vt_symbol".to_string(), Value::String(order.vt_symbol.as_str().to_string()));
    fields.insert("direction".to_string(), encode_direction(order.direction));
    fields.insert("offset".to_string(), encode_offset(order.offset));
    fields.insert("volume".to_string(), decimal_to_value(order.volume));
    fields.insert("traded".to_string(), decimal_to_value(order.traded));
    fields.insert("status".to_string(), encode_order_status(order.status));
    fields.insert("price".to_string(), decimal_to_value(order.price));
    mark_dataclass("aegis_core.TrackedOrder", fields)
}

fn decode_tracked_order(value: &Value) -> Result<TrackedOrder, serde_json::Error> {
    let obj = unmark_dataclass(value, "aegis_core.TrackedOrder")?;
    Ok(TrackedOrder {
        vt_orderid: VtOrderId::new(get_str(obj, "vt_orderid")?),
        vt_symbol: VtSymbol::new(get_str(obj, "vt_symbol")?),
        direction: decode_direction(get(obj, "direction")?)?,
        offset: decode_offset(get(obj, "offset")?)?,
        volume: decode_decimal(get(obj, "volume")?)?,
        traded: decode_decimal(get(obj, "traded")?)?,
        status: decode_order_status(get(obj, "status")?)?,
        price: decode_decimal(get(obj, "price")?)?,
    })
}

fn encode_position_aggregate(agg: &PositionAggregateSnapshot) -> Result<Value, serde_json::Error> {
    let positions: Vec<Value> = agg.positions.iter().map(encode_position_record).collect();
    let pending_orders: Vec<Value> = agg.pending_orders.iter().map(encode_tracked_order).collect();
    let daily: Map<String, Value> = agg
        .daily_open_volume_by_symbol
        .iter()
        .map(|(symbol, volume)| (symbol.clone(), decimal_to_value(*volume)))
        .collect();
    let last_trading_date = match agg.last_trading_date {
        Some(date) => mark_date(date),
        None => Value::Null,
    };
    Ok(json!({
        "positions": positions,
        "pending_orders": pending_orders,
        "daily_open_volume_by_symbol": Value::Object(daily),
        "global_daily_open_volume": decimal_to_value(agg.global_daily_open_volume),
        "last_trading_date": last_trading_date,
    }))
}

fn decode_position_aggregate(value: &Value) -> Result<PositionAggregateSnapshot, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("position_aggregate must be an object"))?;
    let positions = get(obj, "positions")?
        .as_array()
        .ok_or_else(|| custom("positions must be an array"))?
        .iter()
        .map(decode_position_record)
        .collect::<Result<Vec<_>, _>>()?;
    let pending_orders = get(obj, "pending_orders")?
        .as_array()
        .ok_or_else(|| custom("pending_orders must be an array"))?
        .iter()
        .map(decode_tracked_order)
        .collect::<Result<Vec<_>, _>>()?;
    let daily_obj = get(obj, "daily_open_volume_by_symbol")?.as_object().ok_or_else(|| custom("daily_open_volume_by_symbol must be an object"))?;
    let mut daily_open_volume_by_symbol = HashMap::new();
    for (symbol, volume) in daily_obj {
        daily_open_volume_by_symbol.insert(symbol.clone(), decode_decimal(volume)?);
    }
    let global_daily_open_volume = decode_decimal(get(obj, "global_daily_open_volume")?)?;
    let last_trading_date = match get(obj, "last_trading_date")? {
        Value::Null => None,
        other => Some(unmark_date(other)?),
    };
    Ok(PositionAggregateSnapshot { positions, pending_orders, daily_open_volume_by_symbol, global_daily_open_volume, last_trading_date })
}

// --- Top level ------------------------------------------------------------------------------

pub fn encode_snapshot(snapshot: &StrategyStateSnapshot) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "schema_version": snapshot.schema_version,
        "saved_at": mark_datetime(snapshot.saved_at),
        "target_aggregate": encode_instrument_aggregate(&snapshot.target_aggregate)?,
        "position_aggregate": encode_position_aggregate(&snapshot.position_aggregate)?,
        "current_dt": mark_datetime(snapshot.current_dt),
    }))
}

pub fn decode_snapshot(value: &Value) -> Result<StrategyStateSnapshot, serde_json::Error> {
    let obj = value.as_object().ok_or_else(|| custom("snapshot must be a JSON object"))?;
    Ok(StrategyStateSnapshot {
        schema_version: get(obj, "schema_version")?.as_u64().ok_or_else(|| custom("schema_version must be an integer"))? as u32,
        saved_at: unmark_datetime(get(obj, "saved_at")?)?,
        target_aggregate: decode_instrument_aggregate(get(obj, "target_aggregate")?)?,
        position_aggregate: decode_position_aggregate(get(obj, "position_aggregate")?)?,
        current_dt: unmark_datetime(get(obj, "current_dt")?)?,
    })
}

/// Testable property 11: true iff `raw_json` parses and carries an integer `schema_version`.
/// Used by the repository before attempting the full typed decode, so a corrupt row is reported
/// as [`crate::errors::CorruptionError`] rather than an opaque decode panic.
pub fn verify_integrity(raw_json: &str) -> bool {
    match serde_json::from_str::<Value>(raw_json) {
        Ok(value) => value.get("schema_version").and_then(Value::as_u64).is_some(),
        Err(_) => false,
    }
}
