use std::path::Path;

use gwr_core::SourceTag;
use gwr_feeds::{adapter_for_source, load_payload_file, DEFAULT_SEASON};

fn decoded_names(source: SourceTag, file: &str) -> Vec<String> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let payload = load_payload_file(source, root.join("fixtures").join(source.as_str()).join(file)).unwrap();
    let adapter = adapter_for_source(source, payload.url.clone(), DEFAULT_SEASON);
    let mut names: Vec<String> = adapter
        .decode(&payload.body)
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.display_name)
        .collect();
    names.sort();
    names
}

#[test]
fn fantasy_fixture_snapshot() {
    assert_eq!(
        decoded_names(SourceTag::Fantasy, "bootstrap.json"),
        vec![
            "Bamidele Alli",
            "Benjamin White",
            "Bruno Miguel Borges Fernandes",
            "Dara O'Shea",
            "Gabriel dos Santos Magalhães",
            "Heung-Min Son",
            "Illan Meslier",
            "Kepa Arrizabalaga",
            "Mohamed Salah",
        ]
    );
}

#[test]
fn analytics_fixture_snapshot() {
    assert_eq!(
        decoded_names(SourceTag::Analytics, "league_players.json"),
        vec![
            "Ben White",
            "Bruno Fernandes",
            "Dara O&#039;Shea",
            "Dele Alli",
            "Gabriel",
            "Jamie Vardy",
            "Kepa",
            "Mohamed Salah",
            "Son Heung-Min",
        ]
    );
}
