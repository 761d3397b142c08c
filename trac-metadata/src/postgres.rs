//! Postgres-backed [`MetadataDal`] (spec.md §4.2.2 write protocol, §4.2.3
//! selector resolution, §4.2.4 search).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use trac_core::TenantDescriptor;
use trac_types::{BasicType, Value};

use crate::dal::{MetadataDal, NewTag, SearchHit};
use crate::error::{DalError, DalResult};
use crate::search::{LeafTerm, Op, QueryNode, SearchParams};
use crate::selector::{Selector, VersionSelector};
use crate::types::{AttrValue, Header, ObjectId, Tag};

pub struct PgMetadataDal {
    pool: PgPool,
}

impl PgMetadataDal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> DalResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DalError::Internal(e.to_string()))?;
        Ok(())
    }

    /// Looks up `object_id.object_pk` by its public uuid, inserting a
    /// fresh row if it isn't known yet (used by the `new_objects` path).
    async fn object_pk(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        object_id: ObjectId,
        object_type: trac_types::ObjectType,
    ) -> DalResult<i64> {
        if let Some(row) = sqlx::query("SELECT object_pk FROM object_id WHERE tenant_code = $1 AND object_id = $2")
            .bind(tenant)
            .bind(object_id.0)
            .fetch_optional(&mut **tx)
            .await?
        {
            return Ok(row.get::<i64, _>("object_pk"));
        }
        let row = sqlx::query(
            "INSERT INTO object_id (tenant_code, object_id, object_type) VALUES ($1, $2, $3) RETURNING object_pk",
        )
        .bind(tenant)
        .bind(object_id.0)
        .bind(object_type.name())
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get::<i64, _>("object_pk"))
    }

    /// Looks up `object_id.object_pk` for an id that must already have
    /// been reserved by `save_preallocated_ids` — unlike [`object_pk`],
    /// never inserts a fresh row (used by the `preallocated_objects`
    /// path, which attaches a first definition to a reservation rather
    /// than minting a brand-new object).
    async fn existing_object_pk(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        object_id: ObjectId,
    ) -> DalResult<i64> {
        sqlx::query("SELECT object_pk FROM object_id WHERE tenant_code = $1 AND object_id = $2")
            .bind(tenant)
            .bind(object_id.0)
            .fetch_optional(&mut **tx)
            .await?
            .map(|row| row.get::<i64, _>("object_pk"))
            .ok_or_else(|| DalError::MissingItem(format!("object {object_id} was never preallocated")))
    }

    /// Current `isLatestObject=true` row for `object_fk`, row-locked for
    /// the duration of the transaction (spec.md §4.2.2 step 1).
    async fn lock_latest_definition(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        object_fk: i64,
    ) -> DalResult<Option<(i64, i32)>> {
        let row = sqlx::query(
            "SELECT definition_pk, object_version FROM object_definition \
             WHERE tenant_code = $1 AND object_fk = $2 AND is_latest \
             FOR UPDATE",
        )
        .bind(tenant)
        .bind(object_fk)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| (r.get::<i64, _>("definition_pk"), r.get::<i32, _>("object_version"))))
    }

    async fn lock_latest_tag(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        definition_fk: i64,
    ) -> DalResult<Option<(i64, i32)>> {
        let row = sqlx::query(
            "SELECT tag_pk, tag_version FROM tag \
             WHERE tenant_code = $1 AND definition_fk = $2 AND is_latest \
             FOR UPDATE",
        )
        .bind(tenant)
        .bind(definition_fk)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| (r.get::<i64, _>("tag_pk"), r.get::<i32, _>("tag_version"))))
    }

    async fn insert_definition(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        object_fk: i64,
        object_version: i32,
        definition: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> DalResult<i64> {
        let row = sqlx::query(
            "INSERT INTO object_definition \
             (tenant_code, object_fk, object_version, object_timestamp, is_latest, meta_format, meta_version, definition) \
             VALUES ($1, $2, $3, $4, true, 'json', 1, $5) RETURNING definition_pk",
        )
        .bind(tenant)
        .bind(object_fk)
        .bind(object_version)
        .bind(now)
        .bind(definition)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get::<i64, _>("definition_pk"))
    }

    async fn insert_tag(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        definition_fk: i64,
        tag_version: i32,
        object_type: trac_types::ObjectType,
        now: DateTime<Utc>,
    ) -> DalResult<i64> {
        let row = sqlx::query(
            "INSERT INTO tag (tenant_code, definition_fk, tag_version, tag_timestamp, is_latest, object_type) \
             VALUES ($1, $2, $3, $4, true, $5) RETURNING tag_pk",
        )
        .bind(tenant)
        .bind(definition_fk)
        .bind(tag_version)
        .bind(now)
        .bind(object_type.name())
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get::<i64, _>("tag_pk"))
    }

    async fn supersede_definition(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        definition_pk: i64,
        now: DateTime<Utc>,
    ) -> DalResult<()> {
        sqlx::query(
            "UPDATE object_definition SET is_latest = false, superseded = $3 \
             WHERE tenant_code = $1 AND definition_pk = $2",
        )
        .bind(tenant)
        .bind(definition_pk)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn supersede_tag(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        tag_pk: i64,
        now: DateTime<Utc>,
    ) -> DalResult<()> {
        sqlx::query(
            "UPDATE tag SET is_latest = false, superseded = $3 WHERE tenant_code = $1 AND tag_pk = $2",
        )
        .bind(tenant)
        .bind(tag_pk)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_attrs(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        tag_fk: i64,
        attrs: &[AttrValue],
    ) -> DalResult<()> {
        for attr in attrs {
            insert_attr_rows(tx, tenant, tag_fk, attr).await?;
        }
        Ok(())
    }

    /// One pass of §4.2.2's write protocol for a single `NewTag`: lock the
    /// prior latest definition/tag (if any), validate the version the
    /// caller expects, insert fresh rows, and supersede the old ones.
    async fn write_one(
        tx: &mut Transaction<'_, Postgres>,
        tenant: &str,
        new_tag: NewTag,
        expect_version: ExpectVersion,
        now: DateTime<Utc>,
    ) -> DalResult<()> {
        let object_fk = match expect_version {
            ExpectVersion::Preallocated => Self::existing_object_pk(tx, tenant, new_tag.object_id).await?,
            _ => Self::object_pk(tx, tenant, new_tag.object_id, new_tag.object_type).await?,
        };
        let prior_def = Self::lock_latest_definition(tx, tenant, object_fk).await?;

        let object_version = match (expect_version, &prior_def) {
            (ExpectVersion::First, None) | (ExpectVersion::Preallocated, None) => 1,
            (ExpectVersion::First, Some(_)) | (ExpectVersion::Preallocated, Some(_)) => {
                return Err(DalError::DuplicateObject(format!(
                    "object {} already has a definition",
                    new_tag.object_id
                )))
            }
            (ExpectVersion::Next, None) => {
                return Err(DalError::MissingItem(format!(
                    "object {} has no prior version",
                    new_tag.object_id
                )))
            }
            (ExpectVersion::Next, Some((_, prior_version))) => prior_version + 1,
            (ExpectVersion::SameDefinition, None) => {
                return Err(DalError::MissingItem(format!(
                    "object {} has no prior version",
                    new_tag.object_id
                )))
            }
            (ExpectVersion::SameDefinition, Some((_, prior_version))) => *prior_version,
        };

        let definition_fk = match expect_version {
            ExpectVersion::SameDefinition => prior_def.expect("checked above").0,
            _ => {
                let definition_fk =
                    Self::insert_definition(tx, tenant, object_fk, object_version, &new_tag.definition, now)
                        .await?;
                if let Some((prior_pk, _)) = prior_def {
                    Self::supersede_definition(tx, tenant, prior_pk, now).await?;
                }
                definition_fk
            }
        };

        let prior_tag = Self::lock_latest_tag(tx, tenant, definition_fk).await?;
        let tag_version = match (&expect_version, &prior_tag) {
            (ExpectVersion::SameDefinition, Some((_, prior_version))) => prior_version + 1,
            (ExpectVersion::SameDefinition, None) => {
                return Err(DalError::TagVersionConflict(format!(
                    "object {} has no prior tag",
                    new_tag.object_id
                )))
            }
            _ => 1,
        };

        let tag_fk = Self::insert_tag(tx, tenant, definition_fk, tag_version, new_tag.object_type, now).await?;
        if let Some((prior_pk, _)) = prior_tag {
            Self::supersede_tag(tx, tenant, prior_pk, now).await?;
        }
        Self::insert_attrs(tx, tenant, tag_fk, &new_tag.attrs).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ExpectVersion {
    /// `saveNewObjects`: no prior definition; the object id is minted
    /// fresh if it doesn't already exist.
    First,
    /// `savePreallocatedObjects`: no prior definition, and the object id
    /// must already exist from `save_preallocated_ids` — never minted.
    Preallocated,
    /// `saveNewVersions`: a prior definition exists, bump it.
    Next,
    /// `saveNewTags`: reuse the current latest definition, bump the tag.
    SameDefinition,
}

async fn insert_attr_rows(
    tx: &mut Transaction<'_, Postgres>,
    tenant: &str,
    tag_fk: i64,
    attr: &AttrValue,
) -> DalResult<()> {
    match &attr.value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                insert_scalar_attr(tx, tenant, tag_fk, &attr.name, i as i32, item).await?;
            }
            Ok(())
        }
        scalar => insert_scalar_attr(tx, tenant, tag_fk, &attr.name, attr.attr_index, scalar).await,
    }
}

async fn insert_scalar_attr(
    tx: &mut Transaction<'_, Postgres>,
    tenant: &str,
    tag_fk: i64,
    name: &str,
    attr_index: i32,
    value: &Value,
) -> DalResult<()> {
    let attr_type = value.basic_type().name();
    let mut q = sqlx::query(
        "INSERT INTO tag_attr \
         (tenant_code, tag_fk, attr_name, attr_type, attr_index, \
          attr_value_boolean, attr_value_integer, attr_value_float, attr_value_string, \
          attr_value_decimal, attr_value_date, attr_value_datetime) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(tenant)
    .bind(tag_fk)
    .bind(name)
    .bind(attr_type)
    .bind(attr_index);

    q = match value {
        Value::Boolean(b) => q
            .bind(Some(*b))
            .bind(None::<i64>)
            .bind(None::<f64>)
            .bind(None::<String>)
            .bind(None::<rust_decimal::Decimal>)
            .bind(None::<chrono::NaiveDate>)
            .bind(None::<DateTime<Utc>>),
        Value::Integer(i) => q
            .bind(None::<bool>)
            .bind(Some(*i))
            .bind(None::<f64>)
            .bind(None::<String>)
            .bind(None::<rust_decimal::Decimal>)
            .bind(None::<chrono::NaiveDate>)
            .bind(None::<DateTime<Utc>>),
        Value::Float(f) => q
            .bind(None::<bool>)
            .bind(None::<i64>)
            .bind(Some(*f))
            .bind(None::<String>)
            .bind(None::<rust_decimal::Decimal>)
            .bind(None::<chrono::NaiveDate>)
            .bind(None::<DateTime<Utc>>),
        Value::String(s) => q
            .bind(None::<bool>)
            .bind(None::<i64>)
            .bind(None::<f64>)
            .bind(Some(s.clone()))
            .bind(None::<rust_decimal::Decimal>)
            .bind(None::<chrono::NaiveDate>)
            .bind(None::<DateTime<Utc>>),
        Value::Decimal(d) => q
            .bind(None::<bool>)
            .bind(None::<i64>)
            .bind(None::<f64>)
            .bind(None::<String>)
            .bind(Some(*d))
            .bind(None::<chrono::NaiveDate>)
            .bind(None::<DateTime<Utc>>),
        Value::Date(d) => q
            .bind(None::<bool>)
            .bind(None::<i64>)
            .bind(None::<f64>)
            .bind(None::<String>)
            .bind(None::<rust_decimal::Decimal>)
            .bind(Some(*d))
            .bind(None::<DateTime<Utc>>),
        Value::DateTime(dt) => q
            .bind(None::<bool>)
            .bind(None::<i64>)
            .bind(None::<f64>)
            .bind(None::<String>)
            .bind(None::<rust_decimal::Decimal>)
            .bind(None::<chrono::NaiveDate>)
            .bind(Some(trac_types::truncate_to_micros(*dt))),
        Value::Array(_) | Value::Map(_) => {
            return Err(DalError::InvalidSearch(format!(
                "attribute {name} must be primitive, found nested container"
            )))
        }
    };

    q.execute(&mut **tx).await?;
    Ok(())
}

#[async_trait]
impl MetadataDal for PgMetadataDal {
    async fn list_tenants(&self) -> DalResult<Vec<TenantDescriptor>> {
        let rows = sqlx::query("SELECT tenant_code, description FROM tenant ORDER BY tenant_code")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| TenantDescriptor {
                code: r.get("tenant_code"),
                description: r.get("description"),
            })
            .collect())
    }

    async fn save_preallocated_ids(
        &self,
        tenant: &str,
        object_type: trac_types::ObjectType,
        count: u32,
    ) -> DalResult<Vec<ObjectId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = ObjectId::new();
            sqlx::query("INSERT INTO object_id (tenant_code, object_id, object_type) VALUES ($1, $2, $3)")
                .bind(tenant)
                .bind(id.0)
                .bind(object_type.name())
                .execute(&mut *tx)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        DalError::DuplicateObject(id.to_string())
                    }
                    other => DalError::Database(other),
                })?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn save_preallocated_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::Preallocated, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_new_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::First, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_new_versions(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::Next, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_new_tags(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::SameDefinition, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_batch_update(
        &self,
        tenant: &str,
        preallocated: Vec<NewTag>,
        new_objects: Vec<NewTag>,
        new_versions: Vec<NewTag>,
        new_tags: Vec<NewTag>,
    ) -> DalResult<()> {
        // Ordering within a batch per spec.md §4.2.2: preallocatedIds →
        // preallocatedObjects → newObjects → newVersions → newTags. This
        // DAL doesn't split preallocated-ids from preallocated-objects,
        // so that step is folded into `preallocated` here.
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for tag in preallocated {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::First, now).await?;
        }
        for tag in new_objects {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::First, now).await?;
        }
        for tag in new_versions {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::Next, now).await?;
        }
        for tag in new_tags {
            Self::write_one(&mut tx, tenant, tag, ExpectVersion::SameDefinition, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_object(&self, selector: &Selector) -> DalResult<Tag> {
        let object_fk: i64 = sqlx::query(
            "SELECT object_pk FROM object_id WHERE tenant_code = $1 AND object_id = $2",
        )
        .bind(&selector.tenant)
        .bind(selector.object_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DalError::MissingItem(format!("no such object {}", selector.object_id)))?
        .get("object_pk");

        let def_row = resolve_definition(&self.pool, &selector.tenant, object_fk, &selector.object).await?;
        let definition_pk: i64 = def_row.get("definition_pk");
        let object_version: i32 = def_row.get("object_version");
        let object_timestamp: DateTime<Utc> = def_row.get("object_timestamp");
        let object_superseded: Option<DateTime<Utc>> = def_row.get("superseded");
        let object_is_latest: bool = def_row.get("is_latest");
        let definition: serde_json::Value = def_row.get("definition");

        let tag_row = resolve_tag(&self.pool, &selector.tenant, definition_pk, &selector.tag).await?;
        let tag_pk: i64 = tag_row.get("tag_pk");
        let tag_version: i32 = tag_row.get("tag_version");
        let tag_timestamp: DateTime<Utc> = tag_row.get("tag_timestamp");
        let tag_is_latest: bool = tag_row.get("is_latest");
        let object_type_name: String = tag_row.get("object_type");
        let object_type = trac_types::ObjectType::from_name(&object_type_name)
            .ok_or_else(|| DalError::Internal(format!("unknown object type {object_type_name}")))?;

        let attrs = load_attrs(&self.pool, &selector.tenant, tag_pk).await?;

        Ok(Tag {
            header: Header {
                tenant: selector.tenant.clone(),
                object_id: selector.object_id,
                object_type,
                object_version: object_version as u32,
                object_timestamp,
                tag_version: tag_version as u32,
                tag_timestamp,
                is_latest_object: object_is_latest,
                is_latest_tag: tag_is_latest,
                superseded: object_superseded,
            },
            definition,
            attrs,
        })
    }

    async fn load_objects(&self, selectors: &[Selector]) -> DalResult<Vec<Tag>> {
        let mut out = Vec::with_capacity(selectors.len());
        for selector in selectors {
            out.push(self.load_object(selector).await?);
        }
        Ok(out)
    }

    async fn search(&self, tenant: &str, params: &SearchParams) -> DalResult<Vec<SearchHit>> {
        let mut builder = sqlx::QueryBuilder::new(String::new());
        builder.push(
            "SELECT oi.object_id AS object_id, od.object_version AS object_version, t.tag_version AS tag_version \
             FROM tag t \
             JOIN object_definition od ON od.definition_pk = t.definition_fk \
             JOIN object_id oi ON oi.object_pk = od.object_fk \
             WHERE t.tenant_code = ",
        );
        builder.push_bind(tenant.to_owned());
        if !params.prior_versions {
            builder.push(" AND od.is_latest");
        }
        if !params.prior_tags {
            builder.push(" AND t.is_latest");
        }
        if let Some(query) = &params.query {
            builder.push(" AND t.tag_pk IN (");
            push_query_node(&mut builder, query)?;
            builder.push(")");
        }
        if let Some(limit) = params.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                object_id: ObjectId(r.get("object_id")),
                object_version: r.get::<i32, _>("object_version") as u32,
                tag_version: r.get::<i32, _>("tag_version") as u32,
            })
            .collect())
    }
}

async fn resolve_definition(
    pool: &PgPool,
    tenant: &str,
    object_fk: i64,
    selector: &VersionSelector,
) -> DalResult<sqlx::postgres::PgRow> {
    let row = match selector {
        VersionSelector::Latest => {
            sqlx::query(
                "SELECT * FROM object_definition WHERE tenant_code = $1 AND object_fk = $2 AND is_latest",
            )
            .bind(tenant)
            .bind(object_fk)
            .fetch_optional(pool)
            .await?
        }
        VersionSelector::Exact(v) => {
            sqlx::query(
                "SELECT * FROM object_definition WHERE tenant_code = $1 AND object_fk = $2 AND object_version = $3",
            )
            .bind(tenant)
            .bind(object_fk)
            .bind(*v as i32)
            .fetch_optional(pool)
            .await?
        }
        VersionSelector::AsOf(ts) => {
            sqlx::query(
                "SELECT * FROM object_definition WHERE tenant_code = $1 AND object_fk = $2 \
                 AND object_timestamp <= $3 AND (superseded IS NULL OR superseded > $3)",
            )
            .bind(tenant)
            .bind(object_fk)
            .bind(ts)
            .fetch_optional(pool)
            .await?
        }
    };
    row.ok_or_else(|| DalError::MissingItem("no object version matches selector".into()))
}

async fn resolve_tag(
    pool: &PgPool,
    tenant: &str,
    definition_fk: i64,
    selector: &VersionSelector,
) -> DalResult<sqlx::postgres::PgRow> {
    let row = match selector {
        VersionSelector::Latest => {
            sqlx::query("SELECT * FROM tag WHERE tenant_code = $1 AND definition_fk = $2 AND is_latest")
                .bind(tenant)
                .bind(definition_fk)
                .fetch_optional(pool)
                .await?
        }
        VersionSelector::Exact(v) => {
            sqlx::query("SELECT * FROM tag WHERE tenant_code = $1 AND definition_fk = $2 AND tag_version = $3")
                .bind(tenant)
                .bind(definition_fk)
                .bind(*v as i32)
                .fetch_optional(pool)
                .await?
        }
        VersionSelector::AsOf(ts) => {
            sqlx::query(
                "SELECT * FROM tag WHERE tenant_code = $1 AND definition_fk = $2 \
                 AND tag_timestamp <= $3 AND (superseded IS NULL OR superseded > $3)",
            )
            .bind(tenant)
            .bind(definition_fk)
            .bind(ts)
            .fetch_optional(pool)
            .await?
        }
    };
    row.ok_or_else(|| DalError::MissingItem("no tag version matches selector".into()))
}

async fn load_attrs(pool: &PgPool, tenant: &str, tag_pk: i64) -> DalResult<Vec<AttrValue>> {
    let rows = sqlx::query(
        "SELECT attr_name, attr_type, attr_index, \
         attr_value_boolean, attr_value_integer, attr_value_float, attr_value_string, \
         attr_value_decimal, attr_value_date, attr_value_datetime \
         FROM tag_attr WHERE tenant_code = $1 AND tag_fk = $2 ORDER BY attr_name, attr_index",
    )
    .bind(tenant)
    .bind(tag_pk)
    .fetch_all(pool)
    .await?;

    let mut by_name: std::collections::BTreeMap<String, Vec<(i32, Value)>> = Default::default();
    for row in rows {
        let name: String = row.get("attr_name");
        let attr_type: String = row.get("attr_type");
        let index: i32 = row.get("attr_index");
        let basic = BasicType::from_name(&attr_type)
            .ok_or_else(|| DalError::Internal(format!("unknown attr type {attr_type}")))?;
        let value = scalar_from_row(&row, basic)?;
        by_name.entry(name).or_default().push((index, value));
    }

    let mut attrs = Vec::with_capacity(by_name.len());
    for (name, mut values) in by_name {
        values.sort_by_key(|(i, _)| *i);
        if values.len() == 1 && values[0].0 == -1 {
            attrs.push(AttrValue::single(name, values.pop().unwrap().1));
        } else {
            let array = Value::Array(values.into_iter().map(|(_, v)| v).collect());
            attrs.push(AttrValue::single(name, array));
        }
    }
    Ok(attrs)
}

fn scalar_from_row(row: &sqlx::postgres::PgRow, basic: BasicType) -> DalResult<Value> {
    Ok(match basic {
        BasicType::Boolean => Value::Boolean(row.get::<Option<bool>, _>("attr_value_boolean").unwrap_or_default()),
        BasicType::Integer => Value::Integer(row.get::<Option<i64>, _>("attr_value_integer").unwrap_or_default()),
        BasicType::Float => Value::Float(row.get::<Option<f64>, _>("attr_value_float").unwrap_or_default()),
        BasicType::String => Value::String(row.get::<Option<String>, _>("attr_value_string").unwrap_or_default()),
        BasicType::Decimal => Value::Decimal(
            row.get::<Option<rust_decimal::Decimal>, _>("attr_value_decimal")
                .unwrap_or_default(),
        ),
        BasicType::Date => Value::Date(
            row.get::<Option<chrono::NaiveDate>, _>("attr_value_date")
                .ok_or_else(|| DalError::Internal("missing date value".into()))?,
        ),
        BasicType::DateTime => Value::DateTime(
            row.get::<Option<DateTime<Utc>>, _>("attr_value_datetime")
                .ok_or_else(|| DalError::Internal("missing datetime value".into()))?,
        ),
        BasicType::Array | BasicType::Map => {
            return Err(DalError::Internal("container type stored as scalar attr row".into()))
        }
    })
}

/// Translate a [`QueryNode`] into a `SELECT tag_fk FROM ...` sub-select,
/// combined with `INTERSECT`/`UNION`/`EXCEPT` per spec.md §4.2.4.
fn push_query_node<'a>(
    builder: &mut sqlx::QueryBuilder<'a, Postgres>,
    node: &'a QueryNode,
) -> DalResult<()> {
    match node {
        QueryNode::Leaf(leaf) => push_leaf(builder, leaf),
        QueryNode::And(children) => push_combined(builder, children, "INTERSECT"),
        QueryNode::Or(children) => push_combined(builder, children, "UNION"),
        QueryNode::Not(child) => {
            builder.push("SELECT tag_pk FROM tag EXCEPT (");
            push_query_node(builder, child)?;
            builder.push(")");
            Ok(())
        }
    }
}

fn push_combined<'a>(
    builder: &mut sqlx::QueryBuilder<'a, Postgres>,
    children: &'a [QueryNode],
    op: &'static str,
) -> DalResult<()> {
    if children.is_empty() {
        return Err(DalError::InvalidSearch(format!("{op} with no children")));
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            builder.push(format!(" {op} "));
        }
        builder.push("(");
        push_query_node(builder, child)?;
        builder.push(")");
    }
    Ok(())
}

fn push_leaf<'a>(builder: &mut sqlx::QueryBuilder<'a, Postgres>, leaf: &'a LeafTerm) -> DalResult<()> {
    if leaf.op == Op::Exists {
        builder.push("SELECT tag_fk FROM tag_attr WHERE attr_name = ");
        builder.push_bind(leaf.attr_name.clone());
        return Ok(());
    }

    let value_col = match leaf.attr_type {
        BasicType::Boolean => "attr_value_boolean",
        BasicType::Integer => "attr_value_integer",
        BasicType::Float => "attr_value_float",
        BasicType::String => "attr_value_string",
        BasicType::Decimal => "attr_value_decimal",
        BasicType::Date => "attr_value_date",
        BasicType::DateTime => "attr_value_datetime",
        BasicType::Array | BasicType::Map => {
            return Err(DalError::InvalidSearch("search leaves must be primitive-typed".into()))
        }
    };

    let Some(first) = leaf.values.first() else {
        return Err(DalError::InvalidSearch(format!("{} has no comparison value", leaf.attr_name)));
    };
    if first.basic_type() != leaf.attr_type {
        return Err(DalError::InvalidSearch(format!(
            "type mismatch on {}: term declares {} but value is {}",
            leaf.attr_name,
            leaf.attr_type.name(),
            first.basic_type().name()
        )));
    }

    builder.push("SELECT tag_fk FROM tag_attr WHERE attr_name = ");
    builder.push_bind(leaf.attr_name.clone());
    builder.push(format!(" AND {value_col} "));

    match leaf.op {
        Op::Eq => {
            builder.push("= ");
            push_scalar(builder, first);
        }
        Op::Ne => {
            builder.push("<> ");
            push_scalar(builder, first);
        }
        Op::Lt => {
            builder.push("< ");
            push_scalar(builder, first);
        }
        Op::Le => {
            builder.push("<= ");
            push_scalar(builder, first);
        }
        Op::Gt => {
            builder.push("> ");
            push_scalar(builder, first);
        }
        Op::Ge => {
            builder.push(">= ");
            push_scalar(builder, first);
        }
        Op::In => {
            builder.push("IN (");
            for (i, v) in leaf.values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_scalar(builder, v);
            }
            builder.push(")");
        }
        Op::Exists => unreachable!("handled above"),
    }
    Ok(())
}

fn push_scalar<'a>(builder: &mut sqlx::QueryBuilder<'a, Postgres>, value: &'a Value) {
    match value {
        Value::Boolean(b) => builder.push_bind(*b),
        Value::Integer(i) => builder.push_bind(*i),
        Value::Float(f) => builder.push_bind(*f),
        Value::String(s) => builder.push_bind(s.clone()),
        Value::Decimal(d) => builder.push_bind(*d),
        Value::Date(d) => builder.push_bind(*d),
        Value::DateTime(dt) => builder.push_bind(*dt),
        Value::Array(_) | Value::Map(_) => builder.push_bind(None::<String>),
    };
}

// These exercise the real write/read/search path against Postgres;
// `sqlx::test` spins up a fresh migrated database per test from
// `DATABASE_URL`, so they only run where one is configured.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttrValue;

    fn sample_tag(object_id: ObjectId) -> NewTag {
        NewTag {
            object_id,
            object_type: trac_types::ObjectType::Data,
            definition: serde_json::json!({"format": "csv"}),
            attrs: vec![AttrValue::single("owner", Value::String("alice".into()))],
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_new_object_then_load_round_trips(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO tenant (tenant_code, description) VALUES ('ACME', 'Acme Corp')")
            .execute(&pool)
            .await?;
        let dal = PgMetadataDal::new(pool);
        let object_id = ObjectId::new();
        dal.save_new_objects("ACME", vec![sample_tag(object_id)])
            .await
            .expect("save_new_objects");

        let loaded = dal
            .load_object(&Selector::latest("ACME", object_id))
            .await
            .expect("load_object");
        assert_eq!(loaded.header.object_version, 1);
        assert_eq!(loaded.header.tag_version, 1);
        assert_eq!(loaded.attr("owner"), Some(&Value::String("alice".into())));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_new_version_bumps_and_supersedes(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO tenant (tenant_code, description) VALUES ('ACME', 'Acme Corp')")
            .execute(&pool)
            .await?;
        let dal = PgMetadataDal::new(pool);
        let object_id = ObjectId::new();
        dal.save_new_objects("ACME", vec![sample_tag(object_id)])
            .await
            .expect("save_new_objects");
        dal.save_new_versions("ACME", vec![sample_tag(object_id)])
            .await
            .expect("save_new_versions");

        let loaded = dal
            .load_object(&Selector::latest("ACME", object_id))
            .await
            .expect("load_object");
        assert_eq!(loaded.header.object_version, 2);

        let v1 = dal
            .load_object(&Selector {
                tenant: "ACME".into(),
                object_id,
                object: VersionSelector::Exact(1),
                tag: VersionSelector::Latest,
            })
            .await
            .expect("load_object v1");
        assert!(!v1.header.is_latest_object);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_new_version_without_prior_is_missing_item(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO tenant (tenant_code, description) VALUES ('ACME', 'Acme Corp')")
            .execute(&pool)
            .await?;
        let dal = PgMetadataDal::new(pool);
        let err = dal
            .save_new_versions("ACME", vec![sample_tag(ObjectId::new())])
            .await
            .expect_err("should fail without a prior version");
        assert!(matches!(err, DalError::MissingItem(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_preallocated_objects_without_reservation_is_missing_item(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO tenant (tenant_code, description) VALUES ('ACME', 'Acme Corp')")
            .execute(&pool)
            .await?;
        let dal = PgMetadataDal::new(pool);
        let err = dal
            .save_preallocated_objects("ACME", vec![sample_tag(ObjectId::new())])
            .await
            .expect_err("should fail for an id that was never preallocated");
        assert!(matches!(err, DalError::MissingItem(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_preallocated_objects_attaches_to_a_reserved_id(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO tenant (tenant_code, description) VALUES ('ACME', 'Acme Corp')")
            .execute(&pool)
            .await?;
        let dal = PgMetadataDal::new(pool);
        let object_id = dal
            .save_preallocated_ids("ACME", trac_types::ObjectType::Data, 1)
            .await
            .expect("save_preallocated_ids")[0];

        dal.save_preallocated_objects("ACME", vec![sample_tag(object_id)])
            .await
            .expect("save_preallocated_objects");

        let loaded = dal
            .load_object(&Selector::latest("ACME", object_id))
            .await
            .expect("load_object");
        assert_eq!(loaded.header.object_version, 1);
        Ok(())
    }
}
