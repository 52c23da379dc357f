//! Activity create and update requests.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{Money, SkuId};
use serde::{Deserialize, Serialize};
use store::{ActivityStatus, FlashSaleActivity};

use crate::{FlashSaleError, Result};

/// Request to create an activity with its product lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub status: ActivityStatus,
    #[serde(default)]
    pub products: Vec<NewFlashSaleProduct>,
}

/// One product line of a new activity. The product is resolved from the SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlashSaleProduct {
    pub sku_id: SkuId,
    pub flash_price: Money,
    pub stock: u32,
    pub limit_per_user: u32,
    #[serde(default)]
    pub sort: i32,
}

impl NewActivity {
    /// Checks everything that can be checked without the store.
    pub fn validate(&self) -> Result<()> {
        validate_header(&self.title, self.start_time, self.end_time)?;

        let mut seen = HashSet::new();
        for line in &self.products {
            if !line.flash_price.is_positive() {
                return Err(FlashSaleError::Validation(format!(
                    "flash price for SKU {} must be positive",
                    line.sku_id
                )));
            }
            if line.limit_per_user == 0 {
                return Err(FlashSaleError::Validation(format!(
                    "limit per user for SKU {} must be at least 1",
                    line.sku_id
                )));
            }
            if i32::try_from(line.stock).is_err() {
                return Err(FlashSaleError::Validation(format!(
                    "stock for SKU {} is too large",
                    line.sku_id
                )));
            }
            if !seen.insert(line.sku_id) {
                return Err(FlashSaleError::Validation(format!(
                    "SKU {} appears more than once",
                    line.sku_id
                )));
            }
        }
        Ok(())
    }
}

/// Partial update of an activity's own fields. Lines are not touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<ActivityStatus>,
}

impl ActivityPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.status.is_none()
    }

    /// Applies the patch and validates the result.
    pub fn apply(self, activity: &mut FlashSaleActivity) -> Result<()> {
        if let Some(title) = self.title {
            activity.title = title;
        }
        if let Some(start_time) = self.start_time {
            activity.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            activity.end_time = end_time;
        }
        if let Some(status) = self.status {
            activity.status = status;
        }
        validate_header(&activity.title, activity.start_time, activity.end_time)
    }
}

fn validate_header(title: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<()> {
    if title.trim().is_empty() {
        return Err(FlashSaleError::Validation(
            "title must not be empty".to_string(),
        ));
    }
    if start_time >= end_time {
        return Err(FlashSaleError::Validation(
            "start time must be before end time".to_string(),
        ));
    }
    Ok(())
}
