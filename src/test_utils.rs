//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use crate::core::include_cache::CacheEntry;

    /// Generate a header name such as `Wire.h` or `utility/twi.hpp`
    pub fn header_name() -> impl Strategy<Value = String> {
        (
            proptest::option::of("[a-z]{1,6}"),
            "[A-Za-z][A-Za-z0-9_]{0,12}",
            prop_oneof![Just("h"), Just("hpp"), Just("hh")],
        )
            .prop_map(|(dir, stem, ext)| match dir {
                Some(dir) => format!("{dir}/{stem}.{ext}"),
                None => format!("{stem}.{ext}"),
            })
    }

    /// Generate a relative source path such as `src/net/udp.cpp`
    pub fn relative_source_path() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..3),
            "[a-z][a-z0-9_]{0,10}",
            prop_oneof![Just("c"), Just("cpp"), Just("S")],
        )
            .prop_map(|(dirs, stem, ext)| {
                let mut path = dirs.join("/");
                if !path.is_empty() {
                    path.push('/');
                }
                format!("{path}{stem}.{ext}")
            })
    }

    /// Generate one recorded discovery step
    pub fn cache_entry() -> impl Strategy<Value = CacheEntry> {
        (
            proptest::option::of(relative_source_path()),
            proptest::option::of(header_name()),
            proptest::option::of("[a-z]{1,8}"),
        )
            .prop_map(|(source, header, lib)| CacheEntry {
                sourcefile: source.map(|s| PathBuf::from("/build/sketch").join(s)),
                include: header.unwrap_or_default(),
                includepath: lib.map(|l| PathBuf::from("/libs").join(l)),
            })
    }

    /// Generate a recorded discovery trace
    pub fn cache_entries() -> impl Strategy<Value = Vec<CacheEntry>> {
        prop::collection::vec(cache_entry(), 0..12)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::{HEADER_EXTENSIONS, SOURCE_EXTENSIONS};
    use proptest::prelude::*;
    use std::path::Path;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_header_name_generator(name in header_name()) {
            let ext = Path::new(&name).extension().unwrap().to_str().unwrap();
            prop_assert!(HEADER_EXTENSIONS.contains(&ext));
        }

        #[test]
        fn test_relative_source_path_generator(path in relative_source_path()) {
            let path = Path::new(&path);
            prop_assert!(path.is_relative());
            let ext = path.extension().unwrap().to_str().unwrap();
            prop_assert!(SOURCE_EXTENSIONS.contains(&ext));
        }

        #[test]
        fn test_cache_entries_never_use_diverging_marker(entries in cache_entries()) {
            for e in entries {
                prop_assert_ne!(e.sourcefile.as_deref(), Some(Path::new("/diverged.cpp")));
            }
        }
    }
}
