use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use fable_core::tokens::{estimate_block_tokens, estimate_token_count};
use fable_core::world::{Character, Location, LogEntry, SYSTEM_ACTOR_ID};
use fable_prompt::{describe_and_append, ImageContextBuilder};

use crate::clean::clean_entry_text;
use crate::decay::{is_round_kept, qualifies_for_actor};
use crate::{memory_budget, IMAGE_LABEL};

const GAP_MAX_LOCATIONS: usize = 3;
const GAP_MAX_ACTORS: usize = 5;

struct Budget {
    limit: usize,
    used: usize,
}

impl Budget {
    fn try_take(&mut self, tokens: usize) -> bool {
        if self.used + tokens > self.limit {
            return false;
        }
        self.used += tokens;
        true
    }
}

/// Rounds skipped by decay since the last kept round.
#[derive(Default)]
struct GapBuffer<'h> {
    newest: Option<u32>,
    oldest: Option<u32>,
    locations: Vec<&'h str>,
    actors: Vec<&'h str>,
}

impl<'h> GapBuffer<'h> {
    fn absorb(&mut self, round: u32, entries: &[&'h LogEntry], actor_id: &str) {
        self.newest.get_or_insert(round);
        self.oldest = Some(round);

        for &entry in entries {
            if let Some(loc) = entry.location_id.as_deref() {
                push_unique(&mut self.locations, loc);
            }
            let others = entry
                .present_char_ids
                .iter()
                .flatten()
                .map(String::as_str)
                .chain(entry.acting_char_id.as_deref());
            for other in others {
                if other != actor_id && other != SYSTEM_ACTOR_ID {
                    push_unique(&mut self.actors, other);
                }
            }
        }
    }

    /// Summary line for the buffered span, resetting the buffer.
    fn flush(
        &mut self,
        characters: &HashMap<String, Character>,
        locations: &HashMap<String, Location>,
    ) -> Option<String> {
        let gap = std::mem::take(self);
        let (newest, oldest) = (gap.newest?, gap.oldest?);

        let mut line = format!("[R{oldest}-R{newest}] (omitted)");
        if !gap.locations.is_empty() {
            let names: Vec<&str> = gap
                .locations
                .iter()
                .take(GAP_MAX_LOCATIONS)
                .map(|id| locations.get(*id).map_or(*id, |l| l.name.as_str()))
                .collect();
            line.push_str(&format!(" locations: {}", names.join(", ")));
        }
        if !gap.actors.is_empty() {
            let names: Vec<&str> = gap
                .actors
                .iter()
                .take(GAP_MAX_ACTORS)
                .map(|id| characters.get(*id).map_or(*id, |c| c.name.as_str()))
                .collect();
            if !gap.locations.is_empty() {
                line.push(';');
            }
            line.push_str(&format!(" seen: {}", names.join(", ")));
        }
        Some(line)
    }
}

fn push_unique<'h>(list: &mut Vec<&'h str>, value: &'h str) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Memory for one actor: what they witnessed, thinned out by decay sampling
/// and cleaned of engine bookkeeping.
///
/// The current round is the highest round in `history`. Rounds younger than
/// `capacity` are kept in full; older ones are sampled at power-of-two
/// intervals and the skipped spans are summarised in a single line each.
/// Each round is one budget block; the first block that does not fit ends
/// the walk.
#[allow(clippy::too_many_arguments)]
pub fn build_actor_memory<'a>(
    history: &'a [LogEntry],
    actor_id: &str,
    current_location_id: Option<&str>,
    capacity: u32,
    token_limit: usize,
    characters: &HashMap<String, Character>,
    locations: &HashMap<String, Location>,
    mut images: Option<&mut ImageContextBuilder<'a>>,
) -> String {
    let Some(current_round) = history.iter().map(|e| e.round).max() else {
        return String::new();
    };

    let mut rounds: BTreeMap<u32, Vec<&'a LogEntry>> = BTreeMap::new();
    for entry in history
        .iter()
        .filter(|e| qualifies_for_actor(e, actor_id, current_location_id))
    {
        rounds.entry(entry.round).or_default().push(entry);
    }

    let mut budget = Budget {
        limit: memory_budget(token_limit),
        used: 0,
    };
    let mut blocks: Vec<String> = Vec::new();
    let mut gap = GapBuffer::default();
    let (mut kept, mut skipped) = (0usize, 0usize);
    let mut exhausted = false;

    for (&round, entries) in rounds.iter().rev() {
        let age = current_round - round;
        if !is_round_kept(age, capacity) {
            gap.absorb(round, entries, actor_id);
            skipped += 1;
            continue;
        }

        if let Some(line) = gap.flush(characters, locations) {
            if !budget.try_take(estimate_token_count(&line)) {
                exhausted = true;
                break;
            }
            blocks.push(line);
        }

        let past_round = round < current_round;
        let with_images = images.is_some();
        let (shown, lines): (Vec<&LogEntry>, Vec<String>) = entries
            .iter()
            .filter_map(|&entry| {
                let text = format!("[R{round}] {}", clean_entry_text(&entry.content, past_round)?);
                let text = if with_images {
                    describe_and_append(&text, &entry.images, IMAGE_LABEL)
                } else {
                    text
                };
                Some((entry, text))
            })
            .unzip();
        if lines.is_empty() {
            continue;
        }

        if !budget.try_take(estimate_block_tokens(&lines)) {
            exhausted = true;
            break;
        }
        if let Some(builder) = images.as_deref_mut() {
            for entry in shown {
                builder.register_all(&entry.images);
            }
        }
        blocks.push(lines.join("\n"));
        kept += 1;
    }

    if !exhausted {
        if let Some(line) = gap.flush(characters, locations) {
            if budget.try_take(estimate_token_count(&line)) {
                blocks.push(line);
            }
        }
    }

    debug!(
        actor_id,
        current_round,
        kept,
        skipped,
        tokens = budget.used,
        exhausted,
        "actor memory built"
    );

    blocks.reverse();
    blocks.join("\n")
}
