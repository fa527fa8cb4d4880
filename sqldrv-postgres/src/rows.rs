use crate::ResultStream;
use sqldrv_core::{
    Context, Result, Row, RowNames, Rows,
    stream::{self, BoxStream, TryStreamExt},
};

/// Cursor over the rows of a query.
///
/// The first row is fetched before the cursor is handed out, so that errors raised by the server
/// while starting the query surface from the query call itself.
pub struct PostgresRows {
    ctx: Context,
    columns: RowNames,
    rows: BoxStream<'static, Result<Row>>,
    look_ahead: Option<Row>,
    buffered: bool,
    done: bool,
}

impl PostgresRows {
    pub(crate) fn new(ctx: Context, stream: ResultStream) -> Self {
        Self {
            ctx,
            columns: stream.columns,
            rows: stream.rows,
            look_ahead: None,
            buffered: false,
            done: false,
        }
    }

    async fn fetch(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        let row = self.ctx.run(self.rows.try_next()).await?;
        if row.is_none() {
            self.done = true;
        }
        Ok(row)
    }

    pub(crate) async fn preload(&mut self) -> Result<()> {
        self.look_ahead = self.fetch().await?;
        self.buffered = true;
        Ok(())
    }

    /// Whether the first row was already read from the server, or the result found empty.
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    pub(crate) fn discard(&mut self) {
        self.rows = Box::pin(stream::empty::<Result<Row>>());
        self.look_ahead = None;
        self.done = true;
    }
}

impl Rows for PostgresRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.look_ahead.take() {
            return Ok(Some(row));
        }
        self.fetch().await
    }

    fn close(mut self) -> Result<()> {
        self.discard();
        Ok(())
    }
}
