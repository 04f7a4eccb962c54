#![no_main]

use gbw_core::{ConflictPolicy, convert_reader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(conversion) = convert_reader(data, ConflictPolicy::MergeIntoNotes) else {
        return;
    };

    let items = &conversion.document.items;
    let uri_count: usize = items.iter().map(|item| item.login.uris.len()).sum();
    assert_eq!(uri_count, conversion.report.accepted_rows);
    assert!(conversion.report.conflicts.len() <= uri_count.saturating_sub(items.len()));
    for item in items {
        if let Some(notes) = &item.notes {
            assert!(!notes.is_empty());
        }
    }
    let _ = conversion.document.to_json_pretty();
});
