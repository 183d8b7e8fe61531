use crate::{db::row::ViewRow, error::InternalError};
use async_trait::async_trait;

///
/// RowStream
///
/// Pull-based async stream of ordered view rows.
/// Each call suspends at most on one store fetch; dropping the stream
/// abandons any fetch in flight.
///

#[async_trait]
pub trait RowStream: Send {
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError>;
}

pub type RowStreamBox = Box<dyn RowStream>;

#[async_trait]
impl<T> RowStream for Box<T>
where
    T: RowStream + ?Sized,
{
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        self.as_mut().next_row().await
    }
}

/// Drain a stream into a vector.
pub async fn collect_rows<S>(stream: &mut S) -> Result<Vec<ViewRow>, InternalError>
where
    S: RowStream + ?Sized,
{
    let mut out = Vec::new();
    while let Some(row) = stream.next_row().await? {
        out.push(row);
    }

    Ok(out)
}

///
/// VecRowStream
///
/// Adapter exposing one materialized row vector through `RowStream`.
///

#[derive(Debug)]
pub struct VecRowStream {
    rows: std::vec::IntoIter<ViewRow>,
}

impl VecRowStream {
    #[must_use]
    pub fn new(rows: Vec<ViewRow>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl RowStream for VecRowStream {
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        Ok(self.rows.next())
    }
}

///
/// BudgetedRowStream
///
/// Caps upstream row production after a fixed number of emitted rows.
/// Once the budget is exhausted, it never polls the inner stream again.
///

pub struct BudgetedRowStream<S> {
    inner: S,
    remaining: usize,
}

impl<S> BudgetedRowStream<S>
where
    S: RowStream,
{
    #[must_use]
    pub const fn new(inner: S, remaining: usize) -> Self {
        Self { inner, remaining }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S> RowStream for BudgetedRowStream<S>
where
    S: RowStream,
{
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        match self.inner.next_row().await? {
            Some(row) => {
                self.remaining = self.remaining.saturating_sub(1);
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}
