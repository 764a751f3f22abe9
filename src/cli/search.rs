//! Search command implementation

use anyhow::Result;

use super::{log_access, print_json_lines, short_time, truncate};
use crate::store::{SearchQuery, Store};

/// Run a search and print the hits. Returns the number of hits.
pub fn run(store: &Store, query: &SearchQuery, json: bool) -> Result<usize> {
    let hits = store.search(query)?;

    if json {
        print_json_lines(&hits)?;
    } else {
        for hit in &hits {
            let title = hit
                .title
                .as_deref()
                .map(|t| truncate(t, 40))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}:{} #{} [{}] {} | {}",
                hit.provider,
                hit.source_conversation_id,
                hit.position,
                hit.role,
                short_time(hit.created_at.as_deref()),
                title,
            );
            println!("    {}", hit.snippet.replace('\n', " "));
        }
    }

    eprintln!("{} results", hits.len());
    log_access(store, "search", Some(&query.text), hits.len());
    Ok(hits.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Outcome;
    use crate::provider::{NormalizedConversation, NormalizedMessage, Provider, Role};
    use crate::store::now;

    fn store_with(content: &str) -> Store {
        let store = Store::open_in_memory().unwrap();
        let mut conversation = NormalizedConversation::new(Provider::Claude, "abc");
        conversation.push(NormalizedMessage {
            source_message_id: None,
            role: Role::Assistant,
            model: None,
            content: content.to_string(),
            position: 0,
            parent_position: None,
            created_at: None,
        });
        let (id, _) = store.insert_conversation(&conversation, &now()).unwrap();
        store
            .insert_message(id, &conversation, &conversation.messages[0], &now())
            .unwrap();
        store
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            provider: None,
            role: None,
            limit: 20,
        }
    }

    #[test]
    fn test_zero_hits_map_to_no_results() {
        let store = store_with("enable WAL mode");
        let hits = run(&store, &query("postgres"), false).unwrap();
        assert_eq!(hits, 0);
        assert_eq!(Outcome::from_hits(hits), Outcome::NoResults);
        assert_eq!(Outcome::from_hits(hits).exit_code(), 1);
    }

    #[test]
    fn test_hits_are_counted_and_logged() {
        let store = store_with("enable WAL mode");
        let hits = run(&store, &query("wal"), true).unwrap();
        assert_eq!(hits, 1);
        assert_eq!(Outcome::from_hits(hits), Outcome::Done);
        assert_eq!(store.stats().unwrap().searches_logged, 1);
    }

    #[test]
    fn test_malformed_query_is_an_error() {
        let store = store_with("enable WAL mode");
        assert!(run(&store, &query("\"unterminated"), false).is_err());
    }
}
