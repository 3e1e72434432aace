use tracing::debug;

use super::attendance::AttendanceCoordinator;
use crate::errors::CoordinatorError;
use crate::model::{Item, ItemQuery};
use crate::store::{Kind, Versioned};

pub(crate) fn decode_item(record: &Versioned) -> Result<Item, CoordinatorError> {
    let mut item: Item = record.decode()?;
    item.id = Some(record.id.clone());
    Ok(item)
}

fn newest_first(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by(|a, b| b.create_time.cmp(&a.create_time));
    items
}

impl AttendanceCoordinator {
    pub async fn get_item(&self, item_id: &str) -> Result<Item, CoordinatorError> {
        let record = self.store().get(Kind::Item, item_id).await?;
        decode_item(&record)
    }

    /// Every Item, most recently created or updated first.
    pub async fn list_items(&self) -> Result<Vec<Item>, CoordinatorError> {
        let records = self.store().list(Kind::Item).await?;
        let items = records.iter().map(decode_item).collect::<Result<Vec<_>, _>>()?;
        Ok(newest_first(items))
    }

    /// Items matching every field set in `query`, most recent first.
    pub async fn search_items(&self, query: &ItemQuery) -> Result<Vec<Item>, CoordinatorError> {
        let constraints = query.constraints();
        let Some((field, value)) = constraints.first() else {
            return self.list_items().await;
        };

        debug!(field, constraints = constraints.len(), "Searching items");
        let records = self.store().query_by_field(Kind::Item, field, value).await?;
        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            let item = decode_item(record)?;
            if query.matches(&item) {
                items.push(item);
            }
        }
        Ok(newest_first(items))
    }
}
