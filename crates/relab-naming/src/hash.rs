//! Content-hash identity rendered as a memorable word sequence.

use relab_core::{to_canonical_json_bytes, RelabError, Specification};
use sha2::{Digest, Sha256};

/// Derives the content-hash identity for a specification.
///
/// The specification is canonicalized (keys sorted at every depth),
/// SHA-256 hashed, folded down to four bytes, and rendered through a fixed
/// 256-entry word list. Structurally equal specifications always map to
/// the same identity; the result contains only lowercase letters and
/// hyphens, so it is safe as a path component.
pub fn specification_hash(specification: &Specification) -> Result<String, RelabError> {
    let bytes = to_canonical_json_bytes(specification)?;
    let digest = Sha256::digest(bytes);
    Ok(humanize(&digest))
}

/// Folds the digest into four bytes by XOR over equal segments, then maps
/// each byte through the word list.
fn humanize(digest: &[u8]) -> String {
    let segment = digest.len() / 4;
    let words: Vec<&str> = digest
        .chunks(segment)
        .take(4)
        .map(|chunk| {
            let folded = chunk.iter().fold(0u8, |acc, byte| acc ^ byte);
            WORDLIST[folded as usize]
        })
        .collect();
    words.join("-")
}

const WORDLIST: [&str; 256] = [
    "ack", "alabama", "alanine", "alaska", "alpha", "angel", "apart", "april",
    "arizona", "arkansas", "artist", "asparagus", "aspen", "august", "autumn", "avocado",
    "bacon", "bakerloo", "batman", "beer", "berlin", "beryllium", "black", "blossom",
    "blue", "bluebird", "bravo", "bulldog", "burger", "butter", "california", "carbon",
    "cardinal", "carolina", "carpet", "cat", "ceiling", "charlie", "chicken", "coffee",
    "cola", "cold", "colorado", "comet", "connecticut", "crazy", "cup", "dakota",
    "december", "delaware", "delta", "diet", "don", "double", "early", "earth",
    "east", "echo", "edward", "eight", "eighteen", "eleven", "emma", "enemy",
    "equal", "failed", "fanta", "fifteen", "fillet", "finch", "fish", "five",
    "fix", "floor", "florida", "football", "four", "fourteen", "foxtrot", "freddie",
    "friend", "fruit", "gee", "georgia", "glucose", "golf", "green", "grey",
    "hamper", "happy", "harry", "hawaii", "helium", "high", "hot", "hotel",
    "hydrogen", "idaho", "illinois", "india", "indigo", "ink", "iowa", "island",
    "item", "jersey", "jig", "johnny", "juliet", "july", "jupiter", "kansas",
    "kentucky", "kilo", "king", "kitten", "lactose", "lake", "lamp", "lemon",
    "leopard", "lima", "lion", "lithium", "london", "louisiana", "low", "magazine",
    "magnesium", "maine", "mango", "march", "mars", "maryland", "massachusetts", "may",
    "mexico", "michigan", "mike", "minnesota", "mirror", "mississippi", "missouri", "mobile",
    "mockingbird", "monkey", "montana", "moon", "mountain", "muppet", "music", "nebraska",
    "neptune", "network", "nevada", "nine", "nineteen", "nitrogen", "north", "november",
    "nuts", "october", "ohio", "oklahoma", "one", "orange", "oranges", "oregon",
    "oscar", "oven", "oxygen", "papa", "paris", "pasta", "pennsylvania", "pip",
    "pizza", "pluto", "potato", "princess", "purple", "quebec", "queen", "quiet",
    "red", "river", "robert", "robin", "romeo", "rugby", "sad", "salami",
    "saturn", "september", "seven", "seventeen", "shade", "sierra", "single", "sink",
    "six", "sixteen", "skylark", "snake", "social", "sodium", "solar", "south",
    "spaghetti", "speaker", "spring", "stairway", "steak", "stream", "summer", "sweet",
    "table", "tango", "ten", "tennessee", "tennis", "texas", "thirteen", "three",
    "timing", "triple", "twelve", "twenty", "two", "uncle", "undress", "uniform",
    "uranus", "utah", "vegan", "venus", "vermont", "victor", "video", "violet",
    "virginia", "washington", "west", "whiskey", "white", "william", "winner", "winter",
    "wisconsin", "wolfram", "wyoming", "xray", "yankee", "yellow", "zebra", "zulu",
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_specifications_hash_identically() {
        let a: Specification = [
            ("seed".to_string(), json!(1)),
            ("num_calls".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();
        let b: Specification = [
            ("num_calls".to_string(), json!(1)),
            ("seed".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            specification_hash(&a).expect("hash"),
            specification_hash(&b).expect("hash")
        );
    }

    #[test]
    fn distinct_specifications_hash_differently() {
        let a: Specification = [("seed".to_string(), json!(1))].into_iter().collect();
        let b: Specification = [("seed".to_string(), json!(2))].into_iter().collect();
        assert_ne!(
            specification_hash(&a).expect("hash"),
            specification_hash(&b).expect("hash")
        );
    }

    #[test]
    fn rendered_form_is_four_path_safe_words() {
        let spec: Specification = [("seed".to_string(), json!(1))].into_iter().collect();
        let id = specification_hash(&spec).expect("hash");
        assert_eq!(id.split('-').count(), 4);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}
