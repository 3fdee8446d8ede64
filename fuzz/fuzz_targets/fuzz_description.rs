// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smartparse::naming::{sanitize_description, RenamePlan};

#[derive(Arbitrary, Debug)]
struct Input {
    reply: String,
    max_words: u8,
    attempt: u16,
}

fuzz_target!(|input: Input| {
    let description = sanitize_description(&input.reply, input.max_words as usize);

    assert!(!description.contains(['/', '\\', '_', '.', '\n']));
    assert!(!description.starts_with(' ') && !description.ends_with(' '));
    assert!(description.split(' ').count() <= (input.max_words as usize).max(1));

    let plan = RenamePlan {
        description,
        keyword: Some("note".to_string()),
        timestamp: "2025-01-01_00.00.00".to_string(),
        extension: "txt".to_string(),
    };
    let name = plan.file_name(input.attempt as u32);
    assert!(!name.contains('/'));
});
