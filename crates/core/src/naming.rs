//! Output naming: filesystem-safe slugs, collision resolution, archive paths.

use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Fallback base name for sources whose name sanitizes to nothing.
const FALLBACK_BASE: &str = "file";
/// Fallback archive root when the slug sanitizes to nothing.
const FALLBACK_ROOT: &str = "output";

/// Transliterate a name into a lower-case, filesystem-safe slug.
///
/// Combining diacritics are dropped after canonical decomposition, path
/// separators and reserved characters become `_`, and whitespace runs become
/// a single `-`.
pub fn sanitize_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Display name without its final extension.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Page suffix for multi-page sources: `-page-001`.
pub fn page_suffix(page: usize, page_count: usize) -> String {
    if page_count > 1 {
        format!("-page-{:03}", page)
    } else {
        String::new()
    }
}

/// Assigns collision-free names for one conversion run.
#[derive(Debug, Clone)]
pub struct NameResolver {
    archive_root: String,
    /// Next counter to try per base name.
    used: HashMap<String, usize>,
    /// Every final filename handed out so far.
    taken: HashSet<String>,
}

impl NameResolver {
    /// Create a resolver whose artifacts live under `<slug>-<format>/`.
    pub fn new(slug: &str, format_key: &str) -> Self {
        let base = sanitize_name(slug);
        let base = if base.is_empty() {
            FALLBACK_ROOT.to_string()
        } else {
            base
        };
        Self {
            archive_root: format!("{}-{}", base, format_key),
            used: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    pub fn archive_root(&self) -> &str {
        &self.archive_root
    }

    /// Sanitized base name for a source's display name.
    ///
    /// `fallback_id` is used when nothing printable survives sanitization.
    pub fn base_name(display_name: &str, fallback_id: &str) -> String {
        let base = sanitize_name(strip_extension(display_name));
        if base.is_empty() {
            format!("{}-{}", FALLBACK_BASE, fallback_id)
        } else {
            base
        }
    }

    /// Reserve the filenames `<base><suffix>.<extension>` for one source.
    ///
    /// The first use of a base is returned as is; if any of its filenames is
    /// already taken the base is bumped to `-2`, `-3`, ... until every
    /// filename of the group is free. Returned names are in suffix order.
    pub fn reserve<S: AsRef<str>>(
        &mut self,
        base: &str,
        suffixes: &[S],
        extension: &str,
    ) -> Vec<String> {
        let key = if base.is_empty() { FALLBACK_BASE } else { base };
        let mut counter = self.used.get(key).copied().unwrap_or(1);
        loop {
            let candidate = if counter == 1 {
                key.to_string()
            } else {
                format!("{}-{}", key, counter)
            };
            let filenames: Vec<String> = suffixes
                .iter()
                .map(|suffix| flatten(&format!("{}{}.{}", candidate, suffix.as_ref(), extension)))
                .collect();
            if filenames.iter().all(|name| !self.taken.contains(name)) {
                self.used.insert(key.to_string(), counter + 1);
                self.taken.extend(filenames.iter().cloned());
                return filenames;
            }
            counter += 1;
        }
    }

    /// Reserve a single filename, bumping its stem on collision.
    pub fn reserve_one(&mut self, filename: &str) -> String {
        let filename = flatten(filename);
        match filename.rfind('.') {
            Some(idx) if idx > 0 => {
                let (stem, ext) = (&filename[..idx], &filename[idx + 1..]);
                self.reserve(stem, &[""], ext).remove(0)
            }
            _ => {
                let mut counter = 1;
                loop {
                    let candidate = if counter == 1 {
                        filename.clone()
                    } else {
                        format!("{}-{}", filename, counter)
                    };
                    if self.taken.insert(candidate.clone()) {
                        return candidate;
                    }
                    counter += 1;
                }
            }
        }
    }

    /// Archive-relative path for a filename, with separators flattened.
    pub fn archive_path(&self, filename: &str) -> (String, String) {
        let safe = flatten(filename);
        (format!("{}/{}", self.archive_root, safe), safe)
    }
}

fn flatten(filename: &str) -> String {
    filename
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
