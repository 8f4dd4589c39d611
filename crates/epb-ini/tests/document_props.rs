use epb_ini::ConfigDocument;
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,12}"
}

fn value() -> impl Strategy<Value = String> {
    // no leading/trailing whitespace, no newlines
    prop_oneof![
        Just(String::new()),
        "[A-Za-z0-9_./:?=-]([A-Za-z0-9_ ./:?=-]{0,20}[A-Za-z0-9_./:?=-])?",
    ]
}

fn document() -> impl Strategy<Value = Vec<(String, Vec<(String, String)>)>> {
    proptest::collection::btree_map(
        ident(),
        proptest::collection::btree_map(ident(), value(), 0..6),
        0..5,
    )
    .prop_map(|sections| {
        sections
            .into_iter()
            .map(|(name, keys)| (name, keys.into_iter().collect()))
            .collect()
    })
}

fn render(sections: &[(String, Vec<(String, String)>)], spaced: bool) -> String {
    let mut text = String::from(";EDDYPRO_PROCESSING\n");
    for (name, keys) in sections {
        text.push_str(&format!("[{name}]\n"));
        for (key, value) in keys {
            if spaced {
                text.push_str(&format!("{key} = {value}\n"));
            } else {
                text.push_str(&format!("{key}={value}\n"));
            }
        }
        text.push('\n');
    }
    text
}

proptest! {
    #[test]
    fn prop_unpatched_document_round_trips(sections in document()) {
        let canonical = render(&sections, false).replacen(";EDDYPRO_PROCESSING\n", "", 1);
        let doc = ConfigDocument::parse(&canonical).unwrap();
        prop_assert_eq!(doc.to_ini_string(), canonical.clone());

        let reparsed = ConfigDocument::parse(&doc.to_ini_string()).unwrap();
        prop_assert_eq!(reparsed, doc);
    }

    #[test]
    fn prop_spacing_and_comments_normalize(sections in document()) {
        let spaced = ConfigDocument::parse(&render(&sections, true)).unwrap();
        let tight = ConfigDocument::parse(&render(&sections, false)).unwrap();
        prop_assert_eq!(spaced.to_ini_string(), tight.to_ini_string());
    }

    #[test]
    fn prop_set_touches_only_target(sections in document(), new_value in value()) {
        let doc = ConfigDocument::parse(&render(&sections, false)).unwrap();
        if let Some((name, keys)) = sections.iter().find(|(_, keys)| !keys.is_empty()) {
            let (key, _) = &keys[0];
            let mut patched = doc.clone();
            patched.set(name, key, new_value.clone()).unwrap();
            prop_assert_eq!(patched.get(name, key), Some(new_value.as_str()));

            for (other_name, other_keys) in &sections {
                for (other_key, other_value) in other_keys {
                    if other_name != name || other_key != key {
                        prop_assert_eq!(
                            patched.get(other_name, other_key),
                            Some(other_value.as_str())
                        );
                    }
                }
            }
        }
    }
}
