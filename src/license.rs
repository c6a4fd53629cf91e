//! License detection for LICENSE files shipped inside charts.
//!
//! Detection normalizes the text (lowercase, collapsed whitespace) and looks
//! for phrases that are distinctive for each license. The first match wins,
//! so more specific licenses are listed before the ones they embed.

/// Distinctive phrases per SPDX identifier. All phrases must be present.
const SIGNATURES: &[(&str, &[&str])] = &[
    (
        "AGPL-3.0",
        &["gnu affero general public license", "version 3"],
    ),
    (
        "LGPL-3.0",
        &["gnu lesser general public license", "version 3"],
    ),
    (
        "LGPL-2.1",
        &["gnu lesser general public license", "version 2.1"],
    ),
    ("GPL-3.0", &["gnu general public license", "version 3"]),
    ("GPL-2.0", &["gnu general public license", "version 2"]),
    ("Apache-2.0", &["apache license", "version 2.0"]),
    ("MPL-2.0", &["mozilla public license", "2.0"]),
    (
        "BSD-3-Clause",
        &[
            "redistribution and use in source and binary forms",
            "neither the name of",
        ],
    ),
    (
        "BSD-2-Clause",
        &["redistribution and use in source and binary forms"],
    ),
    (
        "MIT",
        &["permission is hereby granted, free of charge, to any person"],
    ),
    (
        "ISC",
        &["permission to use, copy, modify, and/or distribute this software for any purpose"],
    ),
    (
        "Unlicense",
        &["this is free and unencumbered software released into the public domain"],
    ),
];

/// Returns the SPDX identifier of the license text provided, if recognized.
pub fn detect(text: &[u8]) -> Option<String> {
    let normalized = normalize(&String::from_utf8_lossy(text));
    if normalized.is_empty() {
        return None;
    }

    SIGNATURES
        .iter()
        .find(|(_, phrases)| phrases.iter().all(|p| normalized.contains(p)))
        .map(|(id, _)| id.to_string())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
