use poem_openapi::{types::{ParseFromJSON, ToJSON}, Object};

use crate::modules::database::Paginated;

/// Standard list envelope for API results.
#[derive(Debug, Object)]
pub struct DataPage<T: ParseFromJSON + ToJSON + Send + Sync> {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub total_items: u64,
    pub total_pages: Option<u64>,
    pub items: Vec<T>,
}

impl<T: ParseFromJSON + ToJSON + Send + Sync> DataPage<T> {
    pub fn new(
        page: Option<u64>,
        page_size: Option<u64>,
        total_items: u64,
        total_pages: Option<u64>,
        items: Vec<T>,
    ) -> Self {
        Self {
            page,
            page_size,
            total_items,
            total_pages,
            items,
        }
    }
}

impl<T: ParseFromJSON + ToJSON + Send + Sync> From<Paginated<T>> for DataPage<T> {
    fn from(paginated: Paginated<T>) -> Self {
        DataPage::new(
            paginated.page,
            paginated.page_size,
            paginated.total_items,
            paginated.total_pages,
            paginated.items,
        )
    }
}
