//! Lazy, pull-based pagination

use std::iter::FusedIterator;

use super::RateLimitedClient;
use crate::remote::{ActivityApi, ApiError, ApiResult};

/// Iterator over the pages of a listing
///
/// A page is fetched only when `next()` is called, through the client's
/// `execute`, so every page gets retries and quota tracking. Iteration ends
/// after a page shorter than `per_page` or after an error has been yielded.
/// Dropping the iterator is the only cancellation needed.
pub struct Pages<'a, A, T, F> {
    client: &'a mut RateLimitedClient<A>,
    fetch_page: F,
    per_page: u32,
    next_page: u32,
    done: bool,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<'a, A, T, F> Pages<'a, A, T, F>
where
    A: ActivityApi,
    F: FnMut(&A, u32, u32) -> ApiResult<Vec<T>>,
{
    pub(super) fn new(client: &'a mut RateLimitedClient<A>, fetch_page: F, per_page: u32) -> Self {
        Self {
            client,
            fetch_page,
            per_page: per_page.max(1),
            next_page: 1,
            done: false,
            _item: std::marker::PhantomData,
        }
    }
}

impl<A, T, F> Iterator for Pages<'_, A, T, F>
where
    A: ActivityApi,
    F: FnMut(&A, u32, u32) -> ApiResult<Vec<T>>,
{
    type Item = Result<Vec<T>, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page = self.next_page;
        let per_page = self.per_page;
        let fetch_page = &mut self.fetch_page;
        let result = self
            .client
            .execute(|api| fetch_page(api, page, per_page));
        self.next_page += 1;

        match result {
            Ok(items) => {
                log::debug!("[CLIENT] Page {} returned {} items", page, items.len());
                if items.len() < per_page as usize {
                    self.done = true;
                }
                Some(Ok(items))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<A, T, F> FusedIterator for Pages<'_, A, T, F>
where
    A: ActivityApi,
    F: FnMut(&A, u32, u32) -> ApiResult<Vec<T>>,
{
}
