//! libSQL storage for classification reference data (offline mode).
//!
//! The [`ReferenceStore`] wraps a local libSQL database holding the code
//! catalogue, keyword dictionary and crosswalk edges. It is written by
//! `bizclass data import` and read once at process start to build the
//! immutable [`ReferenceData`] the engine shares across requests.
//!
//! **Access rules:**
//! - Import tooling: read-write via [`ReferenceStore::open`]
//! - Classification processes: read-only via [`ReferenceStore::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use bizclass_shared::{BizclassError, Result, Taxonomy, TaxonomyCode};
use bizclass_taxonomy::{CodeRef, CrosswalkRecord, KeywordRecord, ReferenceData, ReferenceFile};

/// Row counts, as reported by `bizclass data stats` and import history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceStats {
    pub codes: usize,
    pub keywords: usize,
    pub keyword_codes: usize,
    pub crosswalk_edges: usize,
}

/// Primary storage handle wrapping a libSQL database.
pub struct ReferenceStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: libsql::Error) -> BizclassError {
    BizclassError::Storage(e.to_string())
}

impl ReferenceStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BizclassError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BizclassError::Storage(format!(
                "reference database not found at {} (run `bizclass data import` first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BizclassError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BizclassError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Replace the stored reference data with `file`.
    ///
    /// The file is validated in full before the database is touched, and the
    /// replacement runs in one transaction, so a bad file never leaves a
    /// half-written dictionary behind.
    pub async fn import(&self, file: &ReferenceFile, source: &str) -> Result<ReferenceStats> {
        self.check_writable()?;
        ReferenceData::from_file(file.clone())?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        tx.execute_batch(
            "DELETE FROM keyword_codes;
             DELETE FROM keywords;
             DELETE FROM crosswalk;
             DELETE FROM taxonomy_codes;",
        )
        .await
        .map_err(storage_err)?;

        for code in &file.codes {
            tx.execute(
                "INSERT INTO taxonomy_codes (taxonomy, code, description) VALUES (?1, ?2, ?3)
                 ON CONFLICT(taxonomy, code) DO UPDATE SET description = excluded.description",
                params![
                    code.taxonomy.as_str(),
                    code.code.trim(),
                    code.description.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        let mut keyword_codes = 0usize;
        for kw in &file.keywords {
            tx.execute(
                "INSERT INTO keywords (phrase, weight) VALUES (?1, ?2)",
                params![kw.phrase.as_str(), kw.weight],
            )
            .await
            .map_err(storage_err)?;
            let keyword_id = tx.last_insert_rowid();

            for code in &kw.codes {
                keyword_codes += tx
                    .execute(
                        "INSERT OR IGNORE INTO keyword_codes (keyword_id, taxonomy, code)
                         VALUES (?1, ?2, ?3)",
                        params![keyword_id, code.taxonomy.as_str(), code.code.trim()],
                    )
                    .await
                    .map_err(storage_err)? as usize;
            }
        }

        let mut crosswalk_edges = 0usize;
        for edge in &file.crosswalk {
            crosswalk_edges += tx
                .execute(
                    "INSERT OR IGNORE INTO crosswalk (from_taxonomy, from_code, to_taxonomy, to_code)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        edge.from.taxonomy.as_str(),
                        edge.from.code.trim(),
                        edge.to.taxonomy.as_str(),
                        edge.to.code.trim()
                    ],
                )
                .await
                .map_err(storage_err)? as usize;
        }

        let stats = ReferenceStats {
            codes: file.codes.len(),
            keywords: file.keywords.len(),
            keyword_codes,
            crosswalk_edges,
        };

        let stats_json = serde_json::json!({
            "codes": stats.codes,
            "keywords": stats.keywords,
            "keyword_codes": stats.keyword_codes,
            "crosswalk_edges": stats.crosswalk_edges,
        });
        tx.execute(
            "INSERT INTO reference_imports (id, source, imported_at, stats_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::now_v7().to_string(),
                source,
                Utc::now().to_rfc3339(),
                stats_json.to_string()
            ],
        )
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        tracing::info!(
            source,
            codes = stats.codes,
            keywords = stats.keywords,
            crosswalk_edges = stats.crosswalk_edges,
            "reference data imported"
        );

        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Read every table back into the interchange format.
    pub async fn load_file(&self) -> Result<ReferenceFile> {
        let mut file = ReferenceFile::default();

        let mut rows = self
            .conn
            .query(
                "SELECT taxonomy, code, description FROM taxonomy_codes ORDER BY taxonomy, code",
                params![],
            )
            .await
            .map_err(storage_err)?;
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let taxonomy: Taxonomy = row.get::<String>(0).map_err(storage_err)?.parse()?;
            file.codes.push(TaxonomyCode::new(
                taxonomy,
                row.get::<String>(1).map_err(storage_err)?,
                row.get::<String>(2).map_err(storage_err)?,
            ));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT k.id, k.phrase, k.weight, kc.taxonomy, kc.code
                 FROM keywords k
                 JOIN keyword_codes kc ON kc.keyword_id = k.id
                 ORDER BY k.id, kc.taxonomy, kc.code",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut current_id: Option<i64> = None;
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let id = row.get::<i64>(0).map_err(storage_err)?;
            let code = CodeRef {
                taxonomy: row.get::<String>(3).map_err(storage_err)?.parse()?,
                code: row.get::<String>(4).map_err(storage_err)?,
            };

            if current_id == Some(id) {
                if let Some(last) = file.keywords.last_mut() {
                    last.codes.push(code);
                }
            } else {
                current_id = Some(id);
                file.keywords.push(KeywordRecord {
                    phrase: row.get::<String>(1).map_err(storage_err)?,
                    weight: row.get::<f64>(2).map_err(storage_err)?,
                    codes: vec![code],
                });
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT from_taxonomy, from_code, to_taxonomy, to_code FROM crosswalk
                 ORDER BY from_taxonomy, from_code, to_taxonomy, to_code",
                params![],
            )
            .await
            .map_err(storage_err)?;
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            file.crosswalk.push(CrosswalkRecord {
                from: CodeRef {
                    taxonomy: row.get::<String>(0).map_err(storage_err)?.parse()?,
                    code: row.get::<String>(1).map_err(storage_err)?,
                },
                to: CodeRef {
                    taxonomy: row.get::<String>(2).map_err(storage_err)?.parse()?,
                    code: row.get::<String>(3).map_err(storage_err)?,
                },
            });
        }

        Ok(file)
    }

    /// Build the immutable, validated reference data from the store.
    pub async fn load_reference_data(&self) -> Result<ReferenceData> {
        let file = self.load_file().await?;
        let data = ReferenceData::from_file(file)?;
        tracing::info!(
            codes = data.code_count(),
            keywords = data.dictionary().len(),
            crosswalk_edges = data.crosswalk().edge_count(),
            "reference data loaded from store"
        );
        Ok(data)
    }

    /// Current row counts.
    pub async fn stats(&self) -> Result<ReferenceStats> {
        Ok(ReferenceStats {
            codes: self.count("taxonomy_codes").await?,
            keywords: self.count("keywords").await?,
            keyword_codes: self.count("keyword_codes").await?,
            crosswalk_edges: self.count("crosswalk").await?,
        })
    }

    async fn count(&self, table: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }

    /// Most recent import as `(source, imported_at)`, if any.
    pub async fn last_import(&self) -> Result<Option<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source, imported_at FROM reference_imports
                 ORDER BY imported_at DESC, id DESC LIMIT 1",
                params![],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<String>(1).map_err(storage_err)?,
            ))),
            None => Ok(None),
        }
    }
}
