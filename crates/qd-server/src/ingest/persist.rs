//! Persistence handler
//!
//! Takes one decoded claim bundle and writes it out: the XML1 summary
//! becomes the root row in `xml1_tong_hop`, every other sub-document
//! type fans out into its own table keyed by the root row's id. The
//! fan-out runs inside a single transaction, with each type's inserts
//! individually fenced so one malformed sub-document never takes down
//! the rest of the claim.

use serde_json::Value;
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use uuid::Uuid;

use qd_common::{QdError, Result};

use crate::bundle::{ClaimBundle, SubDocType};
use crate::events::{
    ProgressData, ProgressPublisher, EVENT_IMPORT_PROGRESS, PHASE_INSERTED_XML, PHASE_PARSING_XML,
};
use crate::normalize::clean_payload;

/// Result of persisting one sub-document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubDocStatus {
    /// Rows written for this type
    Inserted(usize),
    /// Type absent from the bundle or its items path was empty
    Skipped(String),
    /// Insert failed; the rest of the claim was still committed
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SubDocOutcome {
    pub kind: SubDocType,
    pub status: SubDocStatus,
}

/// Result of persisting one full claim bundle.
#[derive(Debug)]
pub struct PersistOutcome {
    pub xml1_id: Uuid,
    pub ma_lk: Option<String>,
    pub sub_docs: Vec<SubDocOutcome>,
}

/// Business key of a claim's root record: insurance card, admission
/// date, settlement month and year, claim-type code, facility code.
#[derive(Debug, Default)]
struct BusinessKey {
    ma_the: Option<String>,
    ngay_vao: Option<String>,
    thang_qt: Option<String>,
    nam_qt: Option<String>,
    ma_loai_kcb: Option<String>,
    ma_cskcb: Option<String>,
}

impl BusinessKey {
    fn from_root(root: &Value) -> Self {
        let get = |key: &str| {
            root.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        Self {
            ma_the: get("maThe"),
            ngay_vao: get("ngayVao"),
            thang_qt: get("thangQt"),
            nam_qt: get("namQt"),
            ma_loai_kcb: get("maLoaiKcb"),
            ma_cskcb: get("maCskcb"),
        }
    }

    fn is_complete(&self) -> bool {
        self.ma_the.is_some()
            && self.ngay_vao.is_some()
            && self.thang_qt.is_some()
            && self.nam_qt.is_some()
            && self.ma_loai_kcb.is_some()
            && self.ma_cskcb.is_some()
    }
}

#[derive(Clone)]
pub struct PersistHandler {
    pool: PgPool,
    publisher: ProgressPublisher,
}

impl PersistHandler {
    pub fn new(pool: PgPool, publisher: ProgressPublisher) -> Self {
        Self { pool, publisher }
    }

    /// Persist one claim bundle and report the per-type outcomes.
    pub async fn create_full_record(
        &self,
        bundle: &ClaimBundle,
        import_session_id: Uuid,
        caller_id: &str,
    ) -> Result<PersistOutcome> {
        let root = bundle
            .get(SubDocType::Xml1)
            .ok_or_else(|| QdError::MissingElement("XML1".to_string()))?;
        let ma_lk = bundle.ma_lk().map(str::to_string);

        self.publisher
            .publish(
                caller_id,
                EVENT_IMPORT_PROGRESS,
                ProgressData {
                    success: true,
                    phase: Some(PHASE_PARSING_XML.to_string()),
                    import_session_id: Some(import_session_id),
                    ma_lk: ma_lk.clone(),
                    ..Default::default()
                },
            )
            .await;

        // The upstream flow marks any existing root row sharing the
        // business key before inserting a fresh one. The touch is
        // best-effort and runs outside the transaction; a fresh root
        // row is inserted either way.
        let key = BusinessKey::from_root(root);
        if let Err(e) = self.touch_existing_root(&key, import_session_id).await {
            tracing::warn!(
                import_session_id = %import_session_id,
                ma_lk = ma_lk.as_deref().unwrap_or(""),
                error = %e,
                "Pre-update of existing root record failed"
            );
            self.publisher
                .publish(
                    caller_id,
                    EVENT_IMPORT_PROGRESS,
                    ProgressData {
                        success: false,
                        phase: Some(PHASE_PARSING_XML.to_string()),
                        import_session_id: Some(import_session_id),
                        ma_lk: ma_lk.clone(),
                        message: Some(format!("Pre-update of existing record failed: {e}")),
                        ..Default::default()
                    },
                )
                .await;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QdError::Database(e.to_string()))?;

        let xml1_id = insert_root(&mut tx, root, &key, import_session_id, ma_lk.as_deref())
            .await
            .map_err(|e| QdError::Database(e.to_string()))?;

        let mut sub_docs = Vec::with_capacity(SubDocType::ALL.len() - 1);
        for kind in SubDocType::ALL {
            if kind == SubDocType::Xml1 {
                continue;
            }
            let status = self
                .persist_sub_doc(&mut tx, bundle, kind, xml1_id, import_session_id, caller_id)
                .await;
            sub_docs.push(SubDocOutcome { kind, status });
        }

        tx.commit()
            .await
            .map_err(|e| QdError::Database(e.to_string()))?;

        self.publisher
            .publish(
                caller_id,
                EVENT_IMPORT_PROGRESS,
                ProgressData {
                    success: true,
                    phase: Some(PHASE_INSERTED_XML.to_string()),
                    import_session_id: Some(import_session_id),
                    xml1_id: Some(xml1_id),
                    ma_lk: ma_lk.clone(),
                    ..Default::default()
                },
            )
            .await;

        tracing::info!(
            import_session_id = %import_session_id,
            xml1_id = %xml1_id,
            ma_lk = ma_lk.as_deref().unwrap_or(""),
            inserted_types = sub_docs
                .iter()
                .filter(|d| matches!(d.status, SubDocStatus::Inserted(_)))
                .count(),
            "Claim bundle persisted"
        );

        Ok(PersistOutcome {
            xml1_id,
            ma_lk,
            sub_docs,
        })
    }

    /// Mark any existing root row with the same business key. Kept as a
    /// plain UPDATE; nothing is deduplicated and a missing match is not
    /// an error.
    async fn touch_existing_root(
        &self,
        key: &BusinessKey,
        import_session_id: Uuid,
    ) -> std::result::Result<u64, sqlx::Error> {
        if !key.is_complete() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE xml1_tong_hop
            SET superseded_by_session = $1, updated_at = now()
            WHERE ma_the = $2
              AND ngay_vao = $3
              AND thang_qt = $4
              AND nam_qt = $5
              AND ma_loai_kcb = $6
              AND ma_cskcb = $7
            "#,
        )
        .bind(import_session_id)
        .bind(&key.ma_the)
        .bind(&key.ngay_vao)
        .bind(&key.thang_qt)
        .bind(&key.nam_qt)
        .bind(&key.ma_loai_kcb)
        .bind(&key.ma_cskcb)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Insert all rows for one sub-document type. Failures are isolated
    /// to the type: they surface as a failure event and a `Failed`
    /// outcome while the rest of the bundle proceeds.
    async fn persist_sub_doc(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        bundle: &ClaimBundle,
        kind: SubDocType,
        xml1_id: Uuid,
        import_session_id: Uuid,
        caller_id: &str,
    ) -> SubDocStatus {
        let Some(payload) = bundle.get(kind) else {
            return SubDocStatus::Skipped("not present in bundle".to_string());
        };

        let descriptor = kind.descriptor();
        let items = descriptor.extract_items(payload);
        if items.is_empty() {
            return SubDocStatus::Skipped("no items at descriptor path".to_string());
        }

        match insert_sub_rows(tx, descriptor.table, xml1_id, &items).await {
            Ok(n) => SubDocStatus::Inserted(n),
            Err(e) => {
                tracing::error!(
                    import_session_id = %import_session_id,
                    xml1_id = %xml1_id,
                    kind = %kind,
                    error = %e,
                    "Sub-document insert failed, continuing with remaining types"
                );
                self.publisher
                    .publish(
                        caller_id,
                        EVENT_IMPORT_PROGRESS,
                        ProgressData {
                            success: false,
                            phase: Some(PHASE_INSERTED_XML.to_string()),
                            import_session_id: Some(import_session_id),
                            xml1_id: Some(xml1_id),
                            message: Some(format!("{kind} insert failed: {e}")),
                            ..Default::default()
                        },
                    )
                    .await;
                SubDocStatus::Failed(e.to_string())
            }
        }
    }
}

async fn insert_root(
    tx: &mut Transaction<'_, Postgres>,
    root: &Value,
    key: &BusinessKey,
    import_session_id: Uuid,
    ma_lk: Option<&str>,
) -> std::result::Result<Uuid, sqlx::Error> {
    let xml1_id = Uuid::new_v4();
    let data = clean_payload(root.clone());

    sqlx::query(
        r#"
        INSERT INTO xml1_tong_hop
            (id, import_session_id, ma_lk, ma_the, ngay_vao,
             thang_qt, nam_qt, ma_loai_kcb, ma_cskcb, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(xml1_id)
    .bind(import_session_id)
    .bind(ma_lk)
    .bind(&key.ma_the)
    .bind(&key.ngay_vao)
    .bind(&key.thang_qt)
    .bind(&key.nam_qt)
    .bind(&key.ma_loai_kcb)
    .bind(&key.ma_cskcb)
    .bind(&data)
    .execute(&mut **tx)
    .await?;

    Ok(xml1_id)
}

async fn insert_sub_rows(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    xml1_id: Uuid,
    items: &[Value],
) -> std::result::Result<usize, sqlx::Error> {
    // SAVEPOINT fence: a failed type must not poison the outer
    // transaction for the remaining types.
    let mut savepoint = tx.begin().await?;

    // Table names come from the static descriptor table only.
    let sql = format!("INSERT INTO {table} (id, xml1_id, data) VALUES ($1, $2, $3)");
    let mut inserted = 0usize;
    for item in items {
        let data = clean_payload(item.clone());
        sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(xml1_id)
            .bind(&data)
            .execute(&mut *savepoint)
            .await?;
        inserted += 1;
    }

    savepoint.commit().await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_business_key_extraction() {
        let root = json!({
            "maLk": "LK1",
            "maThe": "DN4010123456789",
            "ngayVao": "202401011030",
            "thangQt": "1",
            "namQt": "2024",
            "maLoaiKcb": "01",
            "maCskcb": "01234"
        });
        let key = BusinessKey::from_root(&root);
        assert!(key.is_complete());
        assert_eq!(key.ma_the.as_deref(), Some("DN4010123456789"));
        assert_eq!(key.nam_qt.as_deref(), Some("2024"));
    }

    #[test]
    fn test_business_key_treats_blank_as_missing() {
        let root = json!({
            "maThe": "  ",
            "ngayVao": "202401011030"
        });
        let key = BusinessKey::from_root(&root);
        assert!(key.ma_the.is_none());
        assert!(!key.is_complete());
    }

    #[test]
    fn test_descriptor_tables_are_safe_identifiers() {
        // Table names are interpolated into INSERT statements.
        for kind in SubDocType::ALL {
            let table = kind.descriptor().table;
            assert!(table
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }
}
