//! Relational operators applied to tables read back from stores.

use stampdb::{
    inner_join, left_outer_join, order_by, outer_join, project, select, sum, ColumnData,
    ColumnType, Point, Schema, StampError, Store, StoreOptions, SyncMode, Value,
};
use std::path::Path;
use tempfile::TempDir;

fn options() -> StoreOptions {
    StoreOptions::new().with_sync_mode(SyncMode::None)
}

fn weather_store(path: &Path) -> Store {
    let schema = Schema::new([("temp", ColumnType::Float), ("humidity", ColumnType::String)])
        .unwrap();
    Store::open(path, Some(schema), options()).unwrap()
}

#[test]
fn test_operators_on_store_range() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = weather_store(&temp_dir.path().join("weather.csv"));
    store
        .append(&Point::new(0.0, vec![Value::from(23.5), Value::from("moderate")]))
        .unwrap();
    store
        .append(&Point::new(1.0, vec![Value::from(24.5), Value::from("high")]))
        .unwrap();
    store.compact().unwrap();

    let out = store.read_range(0.0, 10.0).unwrap();
    assert_eq!(out.len(), 2);

    assert_eq!(select("temp > 24", &out).unwrap().len(), 1);

    let projected = project(&["temp"], &out).unwrap();
    assert_eq!(projected.len(), 2);
    assert_eq!(projected.fields().len(), 1);

    assert_eq!(sum("temp", &out).unwrap(), 48.0);

    let ordered = order_by(&["temp"], &out).unwrap();
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered.value(0, "temp"), Some(&Value::Float(23.5)));

    // Inputs are left untouched.
    assert_eq!(out.len(), 2);
    store.close().unwrap();
}

#[test]
fn test_select_errors() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = weather_store(&temp_dir.path().join("weather.csv"));
    store
        .append(&Point::new(0.0, vec![Value::from(23.5), Value::from("moderate")]))
        .unwrap();
    let out = store.read_all();

    for expr in ["temp >> 24", "pressure > 1", "temp > warm", "humidity"] {
        assert!(
            matches!(select(expr, &out), Err(StampError::InvalidPredicate(_))),
            "{expr} should be rejected"
        );
    }
    assert!(matches!(
        sum("humidity", &out),
        Err(StampError::NonNumericColumn { .. })
    ));
}

#[test]
fn test_joins_over_hundred_row_stores() {
    let temp_dir = TempDir::new().unwrap();
    let mut weather = weather_store(&temp_dir.path().join("weather.csv"));
    let humidity = ["low", "moderate", "high"];
    for i in 0..100i64 {
        let temp = (i * 7) % 51;
        let point = Point::new(
            i as f64,
            vec![Value::Integer(temp), Value::from(humidity[(i % 3) as usize])],
        );
        weather.append(&point).unwrap();
    }
    weather.compact().unwrap();

    let sky_schema =
        Schema::new([("weather", ColumnType::String), ("temp", ColumnType::Float)]).unwrap();
    let mut sky = Store::open(temp_dir.path().join("sky.csv"), Some(sky_schema), options()).unwrap();
    let kinds = ["sunny", "rainy", "cloudy"];
    for i in 0..100i64 {
        let temp = (i * 13) % 51;
        let point = Point::new(
            i as f64,
            vec![Value::from(kinds[(i % 3) as usize]), Value::Integer(temp)],
        );
        sky.append(&point).unwrap();
    }
    sky.compact().unwrap();

    let left = weather.read_range(0.0, 100.0).unwrap();
    let right = sky.read_range(0.0, 100.0).unwrap();
    assert_eq!(left.len(), 100);
    assert_eq!(right.len(), 100);

    let inner = inner_join(&left, &right, "temp", "temp").unwrap();
    let names: Vec<&str> = inner.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["time", "temp", "humidity", "time_right", "weather"]);
    assert!(!inner.is_empty());

    let left_outer = left_outer_join(&left, &right, "temp", "temp").unwrap();
    assert!(left_outer.len() >= left.len());
    assert!(left_outer.len() >= inner.len());

    let full = outer_join(&left, &right, "temp", "temp").unwrap();
    assert!(full.len() >= left_outer.len());

    // Every inner row pairs equal keys.
    match inner.column("temp").unwrap() {
        ColumnData::Float(temps) => assert!(temps.iter().all(Option::is_some)),
        other => panic!("unexpected column {:?}", other),
    }
    for row in 0..inner.len() {
        let key = inner.value(row, "temp").unwrap();
        let time = inner.value(row, "time_right").unwrap().as_f64().unwrap();
        let matched = right.value(time as usize, "temp").unwrap();
        assert_eq!(key, matched);
    }
}
