use std::collections::HashMap;

/// Fills blank header cells with `Unnamed: <index>` and disambiguates repeated
/// names as `name.1`, `name.2`, ... so every column stays addressable.
pub(crate) fn normalize_headers<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::new();

    for (idx, name) in raw.into_iter().enumerate() {
        let name = if name.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name
        };

        let count = seen.entry(name.clone()).or_insert(0);
        let unique = if *count == 0 {
            name
        } else {
            format!("{name}.{count}")
        };
        *count += 1;
        headers.push(unique);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::normalize_headers;

    #[test]
    fn blank_and_repeated_headers_are_renamed() {
        let headers = normalize_headers(
            ["Time", "", "Temp", "Temp"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(headers, vec!["Time", "Unnamed: 1", "Temp", "Temp.1"]);
    }
}
