//! Renders a token's provenance as an indented ASCII tree for the audit
//! view. Ancestors that were already printed collapse into a level
//! reference instead of repeating their subtree.

use crate::lineage::{LineageTracker, TokenId};
use std::collections::HashMap;
use std::fmt::Write;

pub fn format_lineage(tracker: &LineageTracker, target: TokenId) -> String {
    let mut tracer = Tracer {
        tracker,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    if tracker.get(target).is_some() {
        let _ = writeln!(tracer.output, "LINEAGE TRACE for token {}:", target);
        let _ = writeln!(
            tracer.output,
            "--------------------------------------------------"
        );
        tracer.trace_token(target, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: unknown token {}", target);
    }
    tracer.output
}

struct Tracer<'a> {
    tracker: &'a LineageTracker,
    visited_at_level: HashMap<TokenId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_token(&mut self, id: TokenId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(id, level);

        // Presence checked by the caller; sources may still dangle if a
        // record was created against an id the registry never saw.
        let rec = match self.tracker.get(id) {
            Some(rec) => rec,
            None => {
                let _ = writeln!(self.output, "{}{} [unrecorded]", prefix, id);
                return;
            }
        };

        let _ = writeln!(
            self.output,
            "{}[L{}] {} [{}] @{} (gen {}, tick {})",
            prefix, level, rec.id, rec.value, rec.origin, rec.generation, rec.created_at
        );

        let sources = rec.sources.clone();
        let stem = self.build_child_stem(prefix);
        for (i, source) in sources.iter().enumerate() {
            let connector = if i == sources.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            self.trace_token(*source, level + 1, &full_prefix);
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}
