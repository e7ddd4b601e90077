//! Query expansion: turn one user prompt into several diverse search queries
//! using a caller-supplied text generator.
//!
//! This stage must never fail: any generator error or unparseable output
//! degrades to searching the prompt verbatim.

use webgather_core::TextGenerator;

/// Lines at or below this length are treated as list-marker noise rather
/// than usable queries.
const MIN_QUERY_CHARS: usize = 5;

fn instruction_for(prompt: &str, count: usize) -> String {
    format!(
        "Given the following user question, generate {count} different search queries \
         that would help find comprehensive information to answer the question.\n\
         \n\
         Make the search queries:\n\
         1. Specific and focused\n\
         2. Use different keywords and approaches\n\
         3. Cover different aspects of the topic\n\
         4. Be suitable for web search engines\n\
         \n\
         User question: {prompt}\n\
         \n\
         Respond with only the search queries, one per line, without numbering or bullets:"
    )
}

/// Strip a leading `1.` / `2)` style number, then a leading `-`/`*`/`•`
/// bullet. Generators add these despite being told not to.
fn strip_list_marker(line: &str) -> &str {
    let s = line.trim();
    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let s = if digits > 0 {
        let rest = &s[digits..];
        rest.strip_prefix('.')
            .or_else(|| rest.strip_prefix(')'))
            .unwrap_or(rest)
            .trim_start()
    } else {
        s
    };
    s.trim_start_matches(['-', '*', '\u{2022}']).trim_start()
}

/// Parse a generator response into candidate queries, one per line.
pub fn parse_generated_queries(response: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in response.lines() {
        let line = strip_list_marker(line);
        if line.chars().count() > MIN_QUERY_CHARS {
            out.push(line.to_string());
        }
    }
    out
}

/// Expand `prompt` into at most `target` search queries (at least one).
///
/// Shortfalls are padded with on-topic template variations rather than
/// invented queries; a generator failure falls back to `[prompt]`.
pub async fn expand(prompt: &str, target: usize, generator: &dyn TextGenerator) -> Vec<String> {
    let target = target.max(1);
    let mut queries = match generator.generate(&instruction_for(prompt, target)).await {
        Ok(response) => parse_generated_queries(&response),
        Err(e) => {
            tracing::warn!("query generation failed, searching the prompt verbatim: {e}");
            return vec![prompt.to_string()];
        }
    };

    pad_and_bound(prompt, target, &mut queries);
    tracing::debug!(count = queries.len(), "expanded prompt into search queries");
    queries
}

/// Ensure at least one query (the prompt itself), pad shortfalls with
/// template variations, and cap at `target`.
fn pad_and_bound(prompt: &str, target: usize, queries: &mut Vec<String>) {
    if queries.is_empty() {
        queries.push(prompt.to_string());
    }
    while queries.len() < target {
        match queries.len() {
            1 => queries.push(format!("what is {prompt}")),
            2 => queries.push(format!("how to {prompt}")),
            _ => break,
        }
    }
    queries.truncate(target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use webgather_core::{Error, Result};

    struct Canned(&'static str);

    #[async_trait::async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::Llm("model unavailable".to_string()))
        }
    }

    #[test]
    fn parse_strips_numbering_and_bullets() {
        let response = "1. autism therapy guidelines 2024\n2) evidence based autism interventions\n- early intervention programs\n* parent training resources\n\u{2022} sensory therapy options\n";
        let qs = parse_generated_queries(response);
        assert_eq!(
            qs,
            vec![
                "autism therapy guidelines 2024",
                "evidence based autism interventions",
                "early intervention programs",
                "parent training resources",
                "sensory therapy options",
            ]
        );
    }

    #[test]
    fn parse_drops_short_lines() {
        let qs = parse_generated_queries("ok\n1.\n-\nlong enough query\n");
        assert_eq!(qs, vec!["long enough query"]);
    }

    #[tokio::test]
    async fn expand_is_bounded_by_target() {
        let gen = Canned("query one here\nquery two here\nquery three here\nquery four here");
        let qs = expand("anything", 2, &gen).await;
        assert_eq!(qs.len(), 2);
    }

    #[tokio::test]
    async fn expand_pads_with_template_variations() {
        let gen = Canned("only one usable query");
        let qs = expand("vitamin d deficiency", 3, &gen).await;
        assert_eq!(
            qs,
            vec![
                "only one usable query",
                "what is vitamin d deficiency",
                "how to vitamin d deficiency",
            ]
        );
    }

    #[tokio::test]
    async fn expand_falls_back_to_prompt_on_garbage_output() {
        let gen = Canned("\n\n1.\n*\n");
        let qs = expand("new autism therapy guidelines", 3, &gen).await;
        assert_eq!(qs[0], "new autism therapy guidelines");
        assert!(!qs.is_empty());
        assert!(qs.len() <= 3);
    }

    #[tokio::test]
    async fn expand_falls_back_to_prompt_on_generator_failure() {
        let qs = expand("new autism therapy guidelines", 3, &Failing).await;
        assert_eq!(qs, vec!["new autism therapy guidelines"]);
    }

    proptest! {
        #[test]
        fn parse_never_yields_short_or_empty_queries(response in ".*") {
            for q in parse_generated_queries(&response) {
                prop_assert!(q.chars().count() > MIN_QUERY_CHARS);
                prop_assert_eq!(q.trim(), q.as_str());
            }
        }

        #[test]
        fn expansion_is_never_empty_and_never_exceeds_target(
            response in ".*",
            target in 1usize..6,
        ) {
            let mut queries = parse_generated_queries(&response);
            pad_and_bound("some prompt", target, &mut queries);
            prop_assert!(!queries.is_empty());
            prop_assert!(queries.len() <= target);
        }
    }
}
