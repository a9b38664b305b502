//! The Item Bank: read-mostly catalog of calibrated items.

use std::collections::BTreeSet;
use std::time::Duration;

use assess_domain::{CefrLevel, IrtParams, Item};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::StorageError;

const ACTIVE_ITEMS_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    content: serde_json::Value,
    item_type: String,
    skill_areas: Json<BTreeSet<String>>,
    target_cefr: String,
    irt_a: f64,
    irt_b: f64,
    irt_c: f64,
    active: bool,
}

impl TryFrom<ItemRow> for Item {
    type Error = StorageError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let target_cefr = parse_cefr(&row.target_cefr)?;
        Ok(Item {
            id: row.id,
            content: row.content,
            item_type: row.item_type,
            skill_areas: row.skill_areas.0,
            target_cefr,
            irt_params: IrtParams {
                a: row.irt_a,
                b: row.irt_b,
                c: row.irt_c,
            },
            active: row.active,
        })
    }
}

fn parse_cefr(s: &str) -> Result<CefrLevel, StorageError> {
    match s {
        "A1" => Ok(CefrLevel::A1),
        "A2" => Ok(CefrLevel::A2),
        "B1" => Ok(CefrLevel::B1),
        "B2" => Ok(CefrLevel::B2),
        "C1" => Ok(CefrLevel::C1),
        "C2" => Ok(CefrLevel::C2),
        other => Err(StorageError::Query(sqlx::Error::Decode(
            format!("invalid cefr level: {other}").into(),
        ))),
    }
}

pub fn cefr_to_str(level: CefrLevel) -> &'static str {
    match level {
        CefrLevel::A1 => "A1",
        CefrLevel::A2 => "A2",
        CefrLevel::B1 => "B1",
        CefrLevel::B2 => "B2",
        CefrLevel::C1 => "C1",
        CefrLevel::C2 => "C2",
    }
}

#[derive(Clone)]
pub struct ItemBankRepository {
    pool: PgPool,
    active_items: TtlCache<(), Vec<Item>>,
}

impl ItemBankRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            active_items: TtlCache::new(ACTIVE_ITEMS_TTL),
        }
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Item, StorageError> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("item {id}")))?;
        row.try_into()
    }

    /// All active items not yet answered in the given session, for item selection.
    ///
    /// The active-item pool is read-mostly and cached in-process for
    /// [`ACTIVE_ITEMS_TTL`]; `exclude_item_ids` is applied after the cache read
    /// so one cached pool serves every session regardless of what it has
    /// already answered.
    pub async fn list_eligible_candidates(
        &self,
        exclude_item_ids: &[Uuid],
    ) -> Result<Vec<Item>, StorageError> {
        let active = match self.active_items.get(&()) {
            Some(items) => items,
            None => {
                let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE active = TRUE")
                    .fetch_all(&self.pool)
                    .await?;
                let items: Vec<Item> = rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
                self.active_items.insert((), items.clone());
                items
            }
        };
        Ok(active
            .into_iter()
            .filter(|item| !exclude_item_ids.contains(&item.id))
            .collect())
    }

    pub async fn create_item(&self, item: &Item) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO items (id, content, item_type, skill_areas, target_cefr, irt_a, irt_b, irt_c, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(item.id)
        .bind(&item.content)
        .bind(&item.item_type)
        .bind(Json(&item.skill_areas))
        .bind(cefr_to_str(item.target_cefr))
        .bind(item.irt_params.a)
        .bind(item.irt_params.b)
        .bind(item.irt_params.c)
        .bind(item.active)
        .execute(&self.pool)
        .await?;
        self.active_items.clear();
        Ok(())
    }
}
