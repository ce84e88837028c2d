use crate::pg_client;
use model::records::record::Record;

pub fn creds(user: &str, pass: &str) -> Record {
    [user, pass].into_iter().collect()
}

pub async fn execute(sql: &str) {
    let client = pg_client().await;
    client.batch_execute(sql).await.expect("execute sql");
}

pub async fn get_row_count(table: &str) -> i64 {
    let client = pg_client().await;
    let row = client
        .query_one(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await
        .expect("count rows");
    row.get(0)
}

/// All `(username, password)` pairs ordered by username.
pub async fn fetch_creds(table: &str) -> Vec<(String, String)> {
    let client = pg_client().await;
    client
        .query(
            &format!("SELECT username, password FROM {table} ORDER BY username"),
            &[],
        )
        .await
        .expect("fetch rows")
        .into_iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect()
}

pub fn file_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("read output file")
        .lines()
        .map(str::to_string)
        .collect()
}
