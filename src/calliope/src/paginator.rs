// Copyright 2025 Calliope Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Automatic pagination for list methods.
//!
//! A [PagedApiCall] wraps the unary caller of a list method. Applications
//! iterate whole pages through [pages][PagedApiCall::pages] or individual
//! elements through [items][PagedApiCall::items]; both follow the
//! response's next-page token until the service returns an empty token,
//! `max_results` elements were produced, or pagination is disabled for the
//! call.

use crate::Result;
use crate::api_call::ApiCall;
use crate::ongoing_call::OngoingCall;
use crate::options::CallOptions;
use futures::FutureExt;
use futures::stream::{BoxStream, Stream, StreamExt, unfold};
use pin_project::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A list request that can carry a page token.
pub trait PageableRequest {
    /// Returns the request positioned at `token`.
    fn with_page_token(self, token: String) -> Self;
}

/// A response type with pagination support.
pub trait PageableResponse {
    type PageItem: Send;

    /// Consumes the response, returning this page's elements.
    fn items(self) -> Vec<Self::PageItem>;

    /// The token of the next page, empty when this is the last page.
    fn next_page_token(&self) -> String;
}

/// The callable for a paginated list method.
pub struct PagedApiCall<Req, Resp> {
    inner: ApiCall<Req, Resp>,
}

impl<Req, Resp> Clone for PagedApiCall<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for PagedApiCall<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedApiCall")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<Req, Resp> PagedApiCall<Req, Resp>
where
    Req: PageableRequest + Clone + Send + 'static,
    Resp: PageableResponse + Send + 'static,
{
    pub fn new(inner: ApiCall<Req, Resp>) -> Self {
        Self { inner }
    }

    /// Fetches a single page, without following page tokens.
    pub fn call(&self, request: Req, options: Option<CallOptions>) -> OngoingCall<Resp> {
        self.inner.call(request, options)
    }

    /// A stream of pages starting at `request`'s position.
    ///
    /// When the merged settings disable `auto_paginate` the stream ends
    /// after the first page.
    pub fn pages(&self, request: Req, options: Option<CallOptions>) -> Paginator<Resp> {
        let merged = self.inner.settings().merge(options.as_ref());
        let auto_paginate = merged.auto_paginate();
        let inner = self.inner.clone();
        let execute = move |token: String| {
            let request = if token.is_empty() {
                request.clone()
            } else {
                request.clone().with_page_token(token)
            };
            let call = inner.call(request, options.clone());
            async move { call.await }.boxed()
        };
        Paginator::new(execute, auto_paginate)
    }

    /// A stream of individual elements, honoring `max_results`.
    pub fn items(&self, request: Req, options: Option<CallOptions>) -> ItemPaginator<Resp> {
        let merged = self.inner.settings().merge(options.as_ref());
        ItemPaginator {
            pages: self.pages(request, options),
            current: VecDeque::new(),
            remaining: merged.max_results(),
        }
    }
}

enum PageState {
    Start,
    Next(String),
    Done,
}

/// A stream over the pages of a list method.
#[pin_project]
pub struct Paginator<T> {
    #[pin]
    stream: BoxStream<'static, Result<T>>,
}

impl<T> Paginator<T>
where
    T: PageableResponse + Send + 'static,
{
    pub(crate) fn new<F>(execute: F, auto_paginate: bool) -> Self
    where
        F: Fn(String) -> futures::future::BoxFuture<'static, Result<T>> + Send + 'static,
    {
        let stream = unfold(PageState::Start, move |state| {
            let token = match state {
                PageState::Start => String::new(),
                PageState::Next(token) => token,
                PageState::Done => return futures::future::ready(None).left_future(),
            };
            let page = execute(token);
            async move {
                match page.await {
                    Ok(page) => {
                        let next = page.next_page_token();
                        let state = if next.is_empty() || !auto_paginate {
                            PageState::Done
                        } else {
                            PageState::Next(next)
                        };
                        Some((Ok(page), state))
                    }
                    // An error ends the stream after it is delivered.
                    Err(e) => Some((Err(e), PageState::Done)),
                }
            }
            .right_future()
        });
        Self {
            stream: stream.boxed(),
        }
    }

    /// The next page, `None` when the listing is complete.
    pub async fn next_page(&mut self) -> Option<Result<T>> {
        self.stream.next().await
    }
}

impl<T> Stream for Paginator<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator").finish()
    }
}

/// A stream over the elements of all pages of a list method.
#[pin_project]
pub struct ItemPaginator<T>
where
    T: PageableResponse,
{
    #[pin]
    pages: Paginator<T>,
    current: VecDeque<T::PageItem>,
    remaining: Option<u64>,
}

impl<T> Stream for ItemPaginator<T>
where
    T: PageableResponse,
{
    type Item = Result<T::PageItem>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if *this.remaining == Some(0) {
                return Poll::Ready(None);
            }
            if let Some(item) = this.current.pop_front() {
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Poll::Ready(Some(Ok(item)));
            }
            match futures::ready!(this.pages.as_mut().poll_next(cx)) {
                Some(Ok(page)) => *this.current = page.items().into(),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl<T> std::fmt::Debug for ItemPaginator<T>
where
    T: PageableResponse,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemPaginator")
            .field("buffered", &self.current.len())
            .field("remaining", &self.remaining)
            .finish()
    }
}
