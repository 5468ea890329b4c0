//! Stable identity for build-artifact script URLs.
//!
//! Bundlers rename assets on every build (`main.3f8a21b.js`,
//! `main.9c0de44.js`). This module masks the volatile token classes with
//! placeholders and derives a stable key so successive builds of the same
//! logical file resolve to one identity.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Identity derived from one raw script URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptIdentity {
    /// Full URL with volatile tokens replaced by placeholders.
    pub normalized: String,
    /// Origin + placeholder-stripped path; the dedup key across builds.
    pub stable_key: String,
    pub host: String,
    pub path: String,
    pub file_name: String,
}

struct Rule {
    re: Regex,
    replacement: &'static str,
}

/// Ordered substitution table. The order is a contract: later rules may
/// rewrite text an earlier rule produced, and reordering changes which
/// placeholder wins on overlapping matches (digit runs of 8+ are hex
/// before they are ever chunks or timestamps). Locked by tests.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    [
        // hex digest
        (r"(?i)[a-f0-9]{8,32}", "[hash]"),
        // dotted content hash
        (r"(?i)\.[a-f0-9]{6,}\.", ".[hash]."),
        // chunk tag
        (r"(?i)chunk[-_.]?\d+", "chunk.[id]"),
        // numeric chunk file
        (r"(?i)(^|/)\d+\.js", "${1}[chunk].js"),
        // semantic version
        (r"(?i)v\d+\.\d+\.\d+(?:-[0-9a-z.]+)?", "[version]"),
        // unix-epoch-like integer
        (r"\b\d{10,13}\b", "[timestamp]"),
        // UUID
        (
            r"(?i)[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
            "[uuid]",
        ),
        // build tag
        (r"(?i)build[-_.]?\d+", "build[n]"),
        // runtime chunk name
        (r"(?i)runtime~\w+", "runtime~[name]"),
    ]
    .into_iter()
    .map(|(pat, replacement)| Rule { re: Regex::new(pat).unwrap(), replacement })
    .collect()
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:hash|id|chunk|version|timestamp|uuid|n|name)\]").unwrap());
static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());
static DOT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());

fn apply_rules(s: &str) -> String {
    let mut out = s.to_string();
    for rule in RULES.iter() {
        out = rule.re.replace_all(&out, rule.replacement).into_owned();
    }
    out
}

fn strip_placeholders(s: &str) -> String {
    let stripped = PLACEHOLDER.replace_all(s, "");
    let stripped = DASH_RUN.replace_all(&stripped, "-");
    DOT_RUN.replace_all(&stripped, ".").into_owned()
}

/// Normalize a raw script URL. A URL that fails to parse must never abort
/// a scan, so the raw string comes back in every field instead.
pub fn normalize(raw: &str) -> ScriptIdentity {
    let parsed = match Url::parse(raw) {
        Ok(u) if u.has_host() => u,
        _ => {
            return ScriptIdentity {
                normalized: raw.to_string(),
                stable_key: raw.to_string(),
                host: raw.to_string(),
                path: raw.to_string(),
                file_name: raw.to_string(),
            }
        }
    };
    let origin = parsed.origin().ascii_serialization();
    let host = parsed.host_str().unwrap_or_default().to_string();
    let path = parsed.path().to_string();
    let file_name = path.rsplit('/').next().unwrap_or_default().to_string();

    // Path and query are normalized independently.
    let norm_path = apply_rules(&path);
    let normalized = match parsed.query() {
        Some(q) => format!("{}{}?{}", origin, norm_path, apply_rules(q)),
        None => format!("{}{}", origin, norm_path),
    };
    // Placeholders are useful for display but stripped entirely for
    // identity comparison.
    let stable_key = format!("{}{}", origin, strip_placeholders(&norm_path));

    ScriptIdentity { normalized, stable_key, host, path, file_name }
}

static JS_EXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(m?js|cjs|jsx|tsx?)$").unwrap());
static LEAD_HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^[a-f0-9]{6,}[._-]").unwrap());
static TRAIL_HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[._-][a-f0-9]{6,}$").unwrap());
static FULL_HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^[a-f0-9]{6,}$").unwrap());

/// Human-readable display name for a script URL ("main.3f8a21b9.js" ->
/// "main"). Falls back to "unknown" when nothing survives the stripping.
pub fn base_name(raw: &str) -> String {
    let file = match Url::parse(raw) {
        Ok(u) if u.has_host() => u.path().rsplit('/').next().unwrap_or_default().to_string(),
        _ => raw.rsplit('/').next().unwrap_or_default().to_string(),
    };
    let mut name = JS_EXT.replace(&file, "").into_owned();
    loop {
        let next = TRAIL_HEX.replace(&name, "").into_owned();
        let next = LEAD_HEX.replace(&next, "").into_owned();
        if next == name {
            break;
        }
        name = next;
    }
    let name = name.trim_matches(&['.', '-', '_'][..]);
    if name.is_empty() || FULL_HEX.is_match(name) {
        "unknown".to_string()
    } else {
        name.to_string()
    }
}
