//! Auxiliary stores for detected idioms, cross-session notes, and aggregate
//! statistics: `patterns`, `memory`, `codebase_stats`. Cache-like — absence
//! of any of these tables is non-fatal, and read paths tolerate it.

use rusqlite::{params, OptionalExtension};
use serde_json::Value as Json;

use crate::error::MuResult;
use crate::model::{CodebaseStat, Memory, Pattern};
use crate::store::Store;

/// Detects recurring conventions from the structural facts a mubase
/// actually records (no raw source text is stored, so detection works off
/// `properties`, names, and edge shapes rather than text grepping).
pub struct PatternDetector;

impl PatternDetector {
    /// Analyze the current graph for conventions, replacing whatever was
    /// previously stored.
    pub fn analyze(store: &Store) -> MuResult<Vec<Pattern>> {
        let mut patterns = Vec::new();
        patterns.extend(Self::detect_documentation_coverage(store)?);
        patterns.extend(Self::detect_naming_convention(store)?);
        patterns.extend(Self::detect_test_coverage(store)?);
        patterns.extend(Self::detect_inheritance_usage(store)?);
        patterns.extend(Self::detect_async_usage(store)?);

        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(patterns)
    }

    fn detect_documentation_coverage(store: &Store) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type IN ('function', 'class')",
            [],
            |row| row.get(0),
        )?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let documented: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type IN ('function', 'class') \
             AND json_extract(properties, '$.docstring') IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let ratio = documented as f64 / total as f64;
        Ok(vec![Pattern {
            id: "documentation_coverage".into(),
            description: format!(
                "{:.0}% of functions/classes have a docstring ({documented}/{total})",
                ratio * 100.0
            ),
            category: "documentation".into(),
            file_count: documented as u32,
            examples: Vec::new(),
            confidence: ratio,
        }])
    }

    fn detect_naming_convention(store: &Store) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type IN ('function', 'class')",
            [],
            |row| row.get(0),
        )?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let snake_case: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'function' AND name LIKE '%\\_%' ESCAPE '\\'",
            [],
            |row| row.get(0),
        )?;

        let mut patterns = Vec::new();
        let ratio = snake_case as f64 / total as f64;
        if ratio > 0.5 {
            patterns.push(Pattern {
                id: "snake_case_naming".into(),
                description: format!(
                    "Uses snake_case naming for {:.0}% of functions",
                    ratio * 100.0
                ),
                category: "naming_convention".into(),
                file_count: snake_case as u32,
                examples: Vec::new(),
                confidence: ratio.min(1.0),
            });
        }
        Ok(patterns)
    }

    fn detect_test_coverage(store: &Store) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let total_fns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'function'",
            [],
            |row| row.get(0),
        )?;
        if total_fns == 0 {
            return Ok(Vec::new());
        }

        let test_fns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'function' \
             AND (name LIKE 'test\\_%' ESCAPE '\\' OR name LIKE '%\\_test' ESCAPE '\\')",
            [],
            |row| row.get(0),
        )?;
        if test_fns == 0 {
            return Ok(Vec::new());
        }

        let ratio = test_fns as f64 / total_fns as f64;
        Ok(vec![Pattern {
            id: "test_coverage_pattern".into(),
            description: format!(
                "{test_fns} test functions for {total_fns} total functions (ratio: {ratio:.2})"
            ),
            category: "testing".into(),
            file_count: test_fns as u32,
            examples: Vec::new(),
            confidence: (ratio * 2.0).min(1.0),
        }])
    }

    fn detect_inheritance_usage(store: &Store) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let total_classes: i64 =
            conn.query_row("SELECT COUNT(*) FROM nodes WHERE type = 'class'", [], |row| row.get(0))?;
        if total_classes == 0 {
            return Ok(Vec::new());
        }

        let with_parent: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT source_id) FROM edges WHERE type = 'inherits'",
            [],
            |row| row.get(0),
        )?;
        if with_parent == 0 {
            return Ok(Vec::new());
        }

        let ratio = with_parent as f64 / total_classes as f64;
        Ok(vec![Pattern {
            id: "inheritance_heavy".into(),
            description: format!(
                "{:.0}% of classes participate in inheritance ({with_parent}/{total_classes})",
                ratio * 100.0
            ),
            category: "architecture".into(),
            file_count: with_parent as u32,
            examples: Vec::new(),
            confidence: ratio.min(1.0),
        }])
    }

    fn detect_async_usage(store: &Store) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let total_fns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'function'",
            [],
            |row| row.get(0),
        )?;
        if total_fns == 0 {
            return Ok(Vec::new());
        }

        let async_fns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE type = 'function' \
             AND json_extract(properties, '$.is_async') = 1",
            [],
            |row| row.get(0),
        )?;
        if async_fns == 0 {
            return Ok(Vec::new());
        }

        let ratio = async_fns as f64 / total_fns as f64;
        Ok(vec![Pattern {
            id: "async_usage".into(),
            description: format!(
                "Uses async functions for {:.0}% of functions ({async_fns}/{total_fns})",
                ratio * 100.0
            ),
            category: "architecture".into(),
            file_count: async_fns as u32,
            examples: Vec::new(),
            confidence: ratio.min(1.0),
        }])
    }
}

/// Pattern storage: replaces the whole set on every save, same as the
/// detector regenerating its findings from scratch on each run.
pub struct PatternsStore;

impl PatternsStore {
    /// Replace all stored patterns with `patterns`.
    pub fn save(store: &mut Store, patterns: &[Pattern]) -> MuResult<()> {
        store.transaction(|tx| {
            tx.execute("DELETE FROM patterns", [])?;
            for pattern in patterns {
                tx.execute(
                    "INSERT INTO patterns (id, description, category, file_count, examples, confidence) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        pattern.id,
                        pattern.description,
                        pattern.category,
                        pattern.file_count,
                        serde_json::to_string(&pattern.examples).unwrap_or_else(|_| "[]".into()),
                        pattern.confidence,
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Stored patterns, optionally filtered by category, highest confidence first.
    pub fn get(store: &Store, category: Option<&str>) -> MuResult<Vec<Pattern>> {
        let conn = store.connection();
        let sql = "SELECT id, description, category, file_count, examples, confidence \
                    FROM patterns WHERE (?1 IS NULL OR category = ?1) ORDER BY confidence DESC";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![category], |row| {
                let examples_json: String = row.get(4)?;
                let examples: Vec<String> = serde_json::from_str(&examples_json).unwrap_or_default();
                Ok(Pattern {
                    id: row.get(0)?,
                    description: row.get(1)?,
                    category: row.get(2)?,
                    file_count: row.get(3)?,
                    examples,
                    confidence: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether any patterns are stored.
    pub fn has_patterns(store: &Store) -> MuResult<bool> {
        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?;
        Ok(count > 0)
    }
}

/// Cross-session notes (`memory` table).
pub struct MemoryStore;

impl MemoryStore {
    /// Store a note for future recall.
    pub fn remember(store: &Store, id: &str, note: &str, tags: &[String]) -> MuResult<()> {
        store.connection().execute(
            "INSERT INTO memory (id, note, created_at, tags) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET note=excluded.note, tags=excluded.tags",
            params![
                id,
                note,
                now_iso(),
                serde_json::to_string(tags).unwrap_or_else(|_| "[]".into()),
            ],
        )?;
        Ok(())
    }

    /// Recall notes, optionally filtered to those carrying `tag`, newest first.
    pub fn recall(store: &Store, tag: Option<&str>) -> MuResult<Vec<Memory>> {
        let conn = store.connection();
        let mut stmt = conn.prepare(
            "SELECT id, note, created_at, tags FROM memory ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let tags_json: String = row.get(3)?;
                let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
                Ok(Memory {
                    id: row.get(0)?,
                    note: row.get(1)?,
                    created_at: row.get(2)?,
                    tags,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match tag {
            Some(tag) => rows.into_iter().filter(|m| m.tags.iter().any(|t| t == tag)).collect(),
            None => rows,
        })
    }
}

/// Generic key/value codebase statistics (`codebase_stats` table), plus a
/// helper to compute and store per-language file distribution.
pub struct StatsStore;

impl StatsStore {
    /// Store a statistic under `key`, replacing any previous value.
    pub fn set_stat(store: &Store, key: &str, value: &Json) -> MuResult<()> {
        store.connection().execute(
            "INSERT INTO codebase_stats (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value.to_string(), now_iso()],
        )?;
        Ok(())
    }

    /// Retrieve a stored statistic, if present.
    pub fn get_stat(store: &Store, key: &str) -> MuResult<Option<Json>> {
        let raw: Option<String> = store
            .connection()
            .query_row("SELECT value FROM codebase_stats WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    /// Compute file-count-by-language distribution from `nodes.file_path`
    /// extensions and store it under the `"languages"` key.
    pub fn compute_language_stats(store: &Store) -> MuResult<CodebaseStat> {
        let conn = store.connection();
        let mut stmt = conn.prepare(
            "SELECT file_path FROM nodes WHERE type = 'module' AND file_path IS NOT NULL",
        )?;
        let paths: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut languages: std::collections::BTreeMap<String, u32> = std::collections::BTreeMap::new();
        for path in &paths {
            if let Some(lang) = language_for_extension(path) {
                *languages.entry(lang.to_string()).or_insert(0) += 1;
            }
        }

        let total: u32 = languages.values().sum();
        let percentages: std::collections::BTreeMap<String, f64> = languages
            .iter()
            .map(|(lang, count)| {
                let pct = if total > 0 { *count as f64 / total as f64 * 100.0 } else { 0.0 };
                (lang.clone(), (pct * 100.0).round() / 100.0)
            })
            .collect();
        let primary_language = languages.iter().max_by_key(|(_, count)| **count).map(|(lang, _)| lang.clone());

        let value = serde_json::json!({
            "languages": languages,
            "percentages": percentages,
            "primary_language": primary_language,
            "total_files": total,
        });

        Self::set_stat(store, "languages", &value)?;
        Ok(CodebaseStat {
            key: "languages".into(),
            value,
            updated_at: now_iso(),
        })
    }
}

fn language_for_extension(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "py" => "Python",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" => "JavaScript",
        "go" => "Go",
        "rs" => "Rust",
        "java" => "Java",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "kt" => "Kotlin",
        "scala" => "Scala",
        "cpp" | "cc" => "C++",
        "c" => "C",
        "h" => "C/C++ Header",
        "hpp" => "C++ Header",
        _ => return None,
    })
}

/// ISO 8601 timestamp without pulling in a datetime crate for this alone.
fn now_iso() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("epoch:{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef};

    fn sample_module() -> ModuleDef {
        ModuleDef {
            name: "auth".into(),
            path: "auth.py".into(),
            language: "python".into(),
            imports: vec![ImportDef {
                module: "os".into(),
                names: vec![],
                alias: None,
                is_from: false,
                is_dynamic: false,
                line: 1,
            }],
            classes: vec![ClassDef {
                name: "AuthService".into(),
                bases: vec![],
                decorators: vec![],
                docstring: Some("Handles login.".to_string()),
                line_start: 1,
                line_end: 20,
                methods: vec![FunctionDef {
                    name: "login".into(),
                    parameters: vec![],
                    return_type: None,
                    decorators: vec![],
                    is_async: false,
                    is_static: false,
                    is_classmethod: false,
                    is_property: false,
                    docstring: None,
                    complexity: 1,
                    line_start: 2,
                    line_end: 5,
                }],
            }],
            functions: vec![FunctionDef {
                name: "test_login".into(),
                parameters: vec![],
                return_type: None,
                decorators: vec![],
                is_async: false,
                is_static: false,
                is_classmethod: false,
                is_property: false,
                docstring: None,
                complexity: 1,
                line_start: 30,
                line_end: 35,
            }],
            docstring: Some("Auth module.".to_string()),
        }
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("test.mubase")).expect("open store");
        crate::builder::build_module(&mut store, &sample_module()).expect("build");
        (dir, store)
    }

    #[test]
    fn test_detect_documentation_coverage() {
        let (_dir, store) = open_store();
        let patterns = PatternDetector::analyze(&store).expect("analyze");
        let doc = patterns.iter().find(|p| p.id == "documentation_coverage").expect("doc pattern");
        assert!(doc.confidence > 0.0);
    }

    #[test]
    fn test_detect_test_coverage_pattern() {
        let (_dir, store) = open_store();
        let patterns = PatternDetector::analyze(&store).expect("analyze");
        let test_pattern = patterns.iter().find(|p| p.id == "test_coverage_pattern");
        assert!(test_pattern.is_some());
    }

    #[test]
    fn test_patterns_store_round_trip() {
        let (_dir, mut store) = open_store();
        let patterns = PatternDetector::analyze(&store).expect("analyze");
        PatternsStore::save(&mut store, &patterns).expect("save");
        assert!(PatternsStore::has_patterns(&store).expect("has_patterns"));

        let loaded = PatternsStore::get(&store, None).expect("get");
        assert_eq!(loaded.len(), patterns.len());
    }

    #[test]
    fn test_memory_remember_and_recall() {
        let (_dir, store) = open_store();
        MemoryStore::remember(&store, "mem:1", "Prefer snake_case", &["naming".to_string()]).expect("remember");
        MemoryStore::remember(&store, "mem:2", "Avoid global state", &["architecture".to_string()]).expect("remember");

        let all = MemoryStore::recall(&store, None).expect("recall all");
        assert_eq!(all.len(), 2);

        let naming_only = MemoryStore::recall(&store, Some("naming")).expect("recall filtered");
        assert_eq!(naming_only.len(), 1);
        assert_eq!(naming_only[0].id, "mem:1");
    }

    #[test]
    fn test_stats_store_set_and_get() {
        let (_dir, store) = open_store();
        StatsStore::set_stat(&store, "custom", &serde_json::json!({"foo": 1})).expect("set_stat");
        let value = StatsStore::get_stat(&store, "custom").expect("get_stat");
        assert_eq!(value, Some(serde_json::json!({"foo": 1})));

        assert_eq!(StatsStore::get_stat(&store, "missing").expect("get_stat"), None);
    }

    #[test]
    fn test_compute_language_stats() {
        let (_dir, store) = open_store();
        let stat = StatsStore::compute_language_stats(&store).expect("compute");
        assert_eq!(stat.key, "languages");
        assert_eq!(stat.value["primary_language"], serde_json::json!("Python"));
        assert_eq!(stat.value["total_files"], serde_json::json!(1));
    }
}
