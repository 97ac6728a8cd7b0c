use std::path::Path;

use blokloc_adapters::{load_snapshot, parse_address};

#[test]
fn bloklocaties_gent_snapshot_addresses_all_parse() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let response = load_snapshot(root.join("fixtures/bloklocaties-gent/sample/response.json"))
        .expect("fixture snapshot loads");

    let cities: Vec<_> = response
        .hits()
        .iter()
        .map(|record| parse_address(&record.fields.adres).expect("address parses").city)
        .collect();
    assert_eq!(cities, vec!["Gent", "Gent", "Merelbeke"]);
}
