//! SQL migration definitions for the reference-data database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: taxonomy_codes, keywords, keyword_codes, crosswalk",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Code catalogue for NAICS / SIC / MCC
CREATE TABLE IF NOT EXISTS taxonomy_codes (
    taxonomy    TEXT NOT NULL CHECK (taxonomy IN ('NAICS', 'SIC', 'MCC')),
    code        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (taxonomy, code)
);

-- Weighted keyword phrases
CREATE TABLE IF NOT EXISTS keywords (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    phrase TEXT NOT NULL UNIQUE,
    weight REAL NOT NULL CHECK (weight > 0)
);

-- Keyword → code mapping (many-to-many)
CREATE TABLE IF NOT EXISTS keyword_codes (
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    taxonomy   TEXT NOT NULL,
    code       TEXT NOT NULL,
    PRIMARY KEY (keyword_id, taxonomy, code),
    FOREIGN KEY (taxonomy, code) REFERENCES taxonomy_codes(taxonomy, code)
);

CREATE INDEX IF NOT EXISTS idx_keyword_codes_code ON keyword_codes(taxonomy, code);

-- Crosswalk edges, stored once; symmetry is applied on load
CREATE TABLE IF NOT EXISTS crosswalk (
    from_taxonomy TEXT NOT NULL,
    from_code     TEXT NOT NULL,
    to_taxonomy   TEXT NOT NULL,
    to_code       TEXT NOT NULL,
    PRIMARY KEY (from_taxonomy, from_code, to_taxonomy, to_code),
    FOREIGN KEY (from_taxonomy, from_code) REFERENCES taxonomy_codes(taxonomy, code),
    FOREIGN KEY (to_taxonomy, to_code) REFERENCES taxonomy_codes(taxonomy, code)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Import history",
            sql: r#"
CREATE TABLE IF NOT EXISTS reference_imports (
    id          TEXT PRIMARY KEY,
    source      TEXT NOT NULL,
    imported_at TEXT NOT NULL,
    stats_json  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
