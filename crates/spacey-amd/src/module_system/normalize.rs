// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module id normalization
//!
//! Turns a possibly relative, possibly `prefix!`-qualified identifier into the
//! canonical key used by the registry. Pure string manipulation: no registry
//! access, no I/O.

/// Separator between an explicit resource kind and the module path
pub const PREFIX_SEPARATOR: char = '!';

/// Split `prefix!path` into its resource kind prefix and path
pub fn split_prefix(id: &str) -> (Option<&str>, &str) {
    match id.split_once(PREFIX_SEPARATOR) {
        Some((prefix, path)) => (Some(prefix), path),
        None => (None, id),
    }
}

/// Whether the path starts with a `./` or `../` segment
pub fn is_relative(path: &str) -> bool {
    path == "."
        || path == ".."
        || path.starts_with("./")
        || path.starts_with("../")
}

/// Normalize an identifier against a base path
///
/// Relative identifiers are joined onto `base`. Dot segments anywhere in the
/// identifier are resolved left to right. An identifier without dot segments
/// is used verbatim, minus leading and trailing slashes. A `prefix!` is
/// carried through untouched.
pub fn normalize(id: &str, base: &str) -> String {
    let (prefix, path) = split_prefix(id);

    let path = if is_relative(path) {
        resolve_dot_segments(&format!("{}{}", directory_of(base), path))
    } else if has_dot_segment(path) {
        resolve_dot_segments(path.trim_start_matches('/'))
    } else {
        path.trim_matches('/').to_string()
    };

    match prefix {
        Some(prefix) => format!("{}{}{}", prefix, PREFIX_SEPARATOR, path),
        None => path,
    }
}

/// Directory portion of a path, including the trailing slash
///
/// `"a/b/c"` yields `"a/b/"`, `"a/b/"` is returned as is and a path without
/// any slash yields `""`.
pub fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "." || segment == "..")
}

fn resolve_dot_segments(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else {
        joined
    }
}
