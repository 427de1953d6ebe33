use ies2::attributes::Attributes;
use ies2::column::ColumnType;
use ies2::convert::{decode_table, encode_document, ConvertOptions};
use ies2::obfuscation::{deobfuscate, obfuscate};
use ies2::row::format_number;
use ies2::{Table, XmlDocument};
use proptest::prelude::*;

fn document(rows: &[(i32, String, Option<String>)]) -> XmlDocument {
    let mut doc = XmlDocument::new("Prop");
    doc.classes = rows
        .iter()
        .enumerate()
        .map(|(i, (quarters, name, note))| {
            let mut class = Attributes::new();
            class.insert("ClassID", (i + 1).to_string());
            class.insert("ClassName", format!("C{i}"));
            class.insert("Price", format_number(*quarters as f64 / 4.0));
            class.insert("Name", name.as_str());
            if let Some(note) = note {
                class.insert("Note", note.as_str());
            }
            class
        })
        .collect();
    doc
}

fn rows() -> impl Strategy<Value = Vec<(i32, String, Option<String>)>> {
    prop::collection::vec(
        (-4_000_000i32..4_000_000, "[A-Za-z][A-Za-z ]{0,15}", prop::option::of("SC[PR]_[A-Za-z]{1,8}")),
        1..20,
    )
}

proptest! {
    #[test]
    fn obfuscation_is_an_involution(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(deobfuscate(&obfuscate(&bytes)), bytes);
    }

    #[test]
    fn number_format_is_idempotent(value in -1.0e9f64..1.0e9) {
        let once = format_number(value);
        let reparsed: f64 = once.parse().unwrap();
        prop_assert_eq!(format_number(reparsed), once);
    }

    #[test]
    fn total_size_matches_written_length(rows in rows()) {
        let opts = ConvertOptions::default();
        let bytes = encode_document(&document(&rows), &opts).unwrap();
        let total = u32::from_le_bytes(bytes[76..80].try_into().unwrap());
        prop_assert_eq!(total as usize, bytes.len());
    }

    #[test]
    fn decode_reproduces_encoded_values(rows in rows()) {
        let opts = ConvertOptions::default();
        let doc = document(&rows);
        let back = decode_table(&encode_document(&doc, &opts).unwrap(), &opts).unwrap();

        prop_assert_eq!(back.classes.len(), doc.classes.len());
        for (original, decoded) in doc.classes.iter().zip(&back.classes) {
            for (key, value) in original.iter() {
                prop_assert_eq!(decoded.get(key), Some(value));
            }
            if !original.contains_key("Note") {
                prop_assert_eq!(decoded.get("Note").unwrap_or("None"), "None");
            }
        }
        let first_seen: Vec<_> = back.classes[0].keys().take(4).collect();
        prop_assert_eq!(first_seen, vec!["ClassID", "ClassName", "Price", "Name"]);
    }

    #[test]
    fn column_indices_are_dense(rows in rows()) {
        let opts = ConvertOptions::default();
        let table = Table::from_document(&document(&rows), &opts.settings().unwrap()).unwrap();
        let mut numbers: Vec<u16> = Vec::new();
        let mut strings: Vec<u16> = Vec::new();
        for col in table.columns.columns() {
            match col.col_type {
                ColumnType::Number => numbers.push(col.index),
                _ => strings.push(col.index),
            }
        }
        numbers.sort_unstable();
        strings.sort_unstable();
        prop_assert_eq!(numbers, (0..table.columns.number_count()).collect::<Vec<_>>());
        prop_assert_eq!(strings, (0..table.columns.string_count()).collect::<Vec<_>>());
    }
}
