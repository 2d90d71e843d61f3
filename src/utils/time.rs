/// Local wall-clock time as an ISO-8601 string with microseconds and no
/// offset. Lexicographic order matches chronological order.
pub fn local_iso_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
