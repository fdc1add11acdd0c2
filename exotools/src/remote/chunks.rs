//! Splitting large queries into archive-sized requests.

use log::debug;

use super::CatalogQueryService;
use crate::error::{ExoError, ExoResult};
use crate::table::CatalogTable;

/// Comma-separated ADQL list of integer ids.
pub fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a string literal for ADQL.
pub fn adql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Run one query per chunk of `ids` and stack the results in chunk order.
///
/// `build_query` receives the chunk as an ADQL id list.
pub async fn query_by_id_chunks<F>(
    service: &dyn CatalogQueryService,
    ids: &[i64],
    chunk_size: usize,
    build_query: F,
) -> ExoResult<CatalogTable>
where
    F: Fn(&str) -> String + Send + Sync,
{
    if chunk_size == 0 {
        return Err(ExoError::validation("chunk size must be at least 1"));
    }
    let total = ids.len().div_ceil(chunk_size);
    let mut result = CatalogTable::empty();
    for (i, chunk) in ids.chunks(chunk_size).enumerate() {
        debug!(
            "Querying chunk {}/{} ({} ids) from {}",
            i + 1,
            total,
            chunk.len(),
            service.endpoint()
        );
        let part = service
            .query(&build_query(&id_list(chunk)))
            .await
            .map_err(|e| e.with_operation("query_by_id_chunks"))?;
        result = if result.num_columns() == 0 {
            part
        } else if part.is_empty() {
            result
        } else {
            result.vstack(&part)?
        };
    }
    Ok(result)
}

/// Page through `select <fields> <from_where> order by <order_by>` with
/// `TOP`/`OFFSET`.
///
/// With no `limit`, the row count is queried first.
pub async fn query_pages(
    service: &dyn CatalogQueryService,
    fields: &str,
    from_where: &str,
    order_by: &str,
    limit: Option<usize>,
    page_size: usize,
) -> ExoResult<CatalogTable> {
    if page_size == 0 {
        return Err(ExoError::validation("page size must be at least 1"));
    }
    let total = match limit {
        Some(limit) => limit,
        None => {
            let counted = service
                .query(&format!("select count(*) as n {}", from_where))
                .await?;
            let n = counted
                .column_names()
                .first()
                .and_then(|name| counted.row(0).i64(name))
                .ok_or_else(|| ExoError::remote("count query returned no value"))?;
            usize::try_from(n).unwrap_or(0)
        }
    };

    let mut result = CatalogTable::empty();
    let mut offset = 0;
    while offset < total {
        let top = page_size.min(total - offset);
        let query = format!(
            "select top {} {} {} order by {} asc offset {}",
            top, fields, from_where, order_by, offset
        );
        debug!("Querying rows {}..{} of {}", offset, offset + top, total);
        let part = service.query(&query).await?;
        let received = part.len();
        result = if result.num_columns() == 0 {
            part
        } else {
            result.vstack(&part)?
        };
        if received < top {
            break;
        }
        offset += top;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, NamedFrom};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CatalogQueryService for Recorder {
        fn endpoint(&self) -> &str {
            "recorder"
        }

        async fn query(&self, adql: &str) -> ExoResult<CatalogTable> {
            self.queries.lock().push(adql.to_string());
            if adql.starts_with("select count") {
                return CatalogTable::new(vec![Column::new("n".into(), vec![Some(5)])]);
            }
            let n = if adql.contains("offset 4") { 1 } else { 2 };
            CatalogTable::new(vec![Column::new("id".into(), vec![Some(1); n])])
        }
    }

    #[test]
    fn test_id_list_and_quoting() {
        assert_eq!(id_list(&[1, 22, 333]), "1, 22, 333");
        assert_eq!(adql_string("O'Brien"), "'O''Brien'");
    }

    #[tokio::test]
    async fn test_query_by_id_chunks() {
        let service = Recorder::default();
        let ids: Vec<i64> = (1..=5).collect();
        let table = query_by_id_chunks(&service, &ids, 2, |list| {
            format!("select id from t where id in ({})", list)
        })
        .await
        .unwrap();
        assert_eq!(table.len(), 6);
        let queries = service.queries.lock();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[2], "select id from t where id in (5)");
    }

    #[tokio::test]
    async fn test_query_pages_counts_first() {
        let service = Recorder::default();
        let table = query_pages(&service, "id", "from t", "id", None, 2).await.unwrap();
        assert_eq!(table.len(), 5);
        let queries = service.queries.lock();
        assert!(queries[0].starts_with("select count(*)"));
        assert_eq!(queries[3], "select top 1 id from t order by id asc offset 4");
    }
}
