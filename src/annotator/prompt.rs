//! Prompt text for the annotation service.

use super::{CardText, ResponseMarkers};

/// Tag vocabulary used when the caller does not provide one.
pub const DEFAULT_TAGS_INSTRUCTIONS: &str = "Tags will need to come from this set: `math`, `ML` (machine learning), `CV` (computer vision), `psycho` (psychology), `hist` (history), `rats` (rationality), `coding`, `physics`, `gen` (general knowledge), `music`, `evo` (evolution). If a card doesn't match any of these tags, just leave the corresponding tags empty or make up your own tag.";

const BACK_PREFIX: &str = "BACK:";

/// Builds the system instructions describing the request and reply format.
///
/// The example reply uses the same markers the parser will look for.
pub fn system_instructions(tags_instructions: &str, markers: &ResponseMarkers) -> String {
    let front = &markers.front_prefix;
    let open = &markers.tag_open;
    let close = &markers.tag_close;

    format!(
        "The following messages will contain one or more flashcards, front and back. \
Each card is on its own line. Your role is to provide tags for each card. \
When answering, write the {front} of the card first, exactly as given, and then the tags within {open}{close}, \
one card per line. The tags are space separated and each tag is a single word. {tags_instructions}

Example message:
{front} Cross entropy and NLL in pytorch {BACK_PREFIX} CE always expects logits. It applies the softmax itself.<br><br>NLL expects probabilities
{front} Terminal lucidity {BACK_PREFIX} Unexpected mental clarity shortly before death in patients with neurological disorders

Example response:
{front} Cross entropy and NLL in pytorch {open}ML{close}
{front} Terminal lucidity {open}gen{close}

The {BACK_PREFIX} part can sometimes be empty; this is normal. Always answer with the {front} and the {open}{close}."
    )
}

/// Builds the user message: one `FRONT: ... BACK: ...` line per card.
pub fn batch_message(cards: &[CardText<'_>], markers: &ResponseMarkers) -> String {
    cards
        .iter()
        .map(|card| {
            format!(
                "{} {} {BACK_PREFIX} {}",
                markers.front_prefix, card.front, card.back
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_message_has_one_line_per_card() {
        let cards = [
            CardText {
                front: "Terminal lucidity",
                back: "Clarity before death",
            },
            CardText {
                front: "Empty back",
                back: "",
            },
        ];
        let message = batch_message(&cards, &ResponseMarkers::default());

        assert_eq!(
            message,
            "FRONT: Terminal lucidity BACK: Clarity before death\nFRONT: Empty back BACK: "
        );
    }

    #[test]
    fn instructions_mention_markers_and_vocabulary() {
        let text = system_instructions("Use only `gen`.", &ResponseMarkers::default());

        assert!(text.contains("<tags></tags>"));
        assert!(text.contains("FRONT: Terminal lucidity <tags>gen</tags>"));
        assert!(text.contains("Use only `gen`."));
    }
}
