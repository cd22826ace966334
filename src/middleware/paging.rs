use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

use crate::resp::envelope::PageMeta;

/// 1-based paging extracted from `?page=` and `?limit=` query parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageState {
    fn default() -> Self {
        PageState { page: 1, limit: 20 }
    }
}

impl PageState {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1) * self.limit
    }

    pub fn meta(&self, total: u64) -> PageMeta {
        PageMeta {
            total,
            page: self.page,
            limit: self.limit,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let page: Option<u64> = request.query_value("page").and_then(|it| it.ok());
        let limit: Option<u64> = request.query_value("limit").and_then(|it| it.ok());

        let defaults = PageState::default();
        Outcome::Success(PageState {
            page: page.filter(|p| *p > 0).unwrap_or(defaults.page),
            limit: limit.filter(|l| *l > 0).unwrap_or(defaults.limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_zero_based() {
        assert_eq!(PageState::default().skip(), 0);
        assert_eq!(PageState { page: 3, limit: 20 }.skip(), 40);
    }

    #[test]
    fn meta_echoes_page_state() {
        let meta = PageState { page: 2, limit: 10 }.meta(35);
        assert_eq!(meta.total, 35);
        assert_eq!(meta.page, 2);
        assert_eq!(meta.limit, 10);
    }
}
