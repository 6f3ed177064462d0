use tower::{buffer::Buffer, limit::ConcurrencyLimit, load_shed::LoadShed, ServiceBuilder};

use super::{Dispatcher, Request};

/// A buffered dispatcher that sheds load once the buffer is full.
pub(in crate::metrics) struct InfluxDbService(
    pub LoadShed<Buffer<ConcurrencyLimit<Dispatcher>, Request>>,
);

impl InfluxDbService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self(
            ServiceBuilder::new()
                .load_shed()
                .buffer(2048)
                .concurrency_limit(32)
                .service(dispatcher),
        )
    }
}
