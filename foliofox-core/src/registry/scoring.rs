//! Deterministic quality scoring: format match (40), size sanity (20),
//! source reputation (20), metadata completeness (20).

/// Plausible file size range for a given format, used by the "size
/// sanity" term. Anything inside the range scores full marks; outside
/// it scores zero rather than failing the result outright — a
/// mis-sized file is still a candidate, just a worse-ranked one.
fn expected_size_range(format: &str) -> Option<(u64, u64)> {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    match format.to_ascii_lowercase().as_str() {
        "epub" | "mobi" | "azw3" => Some((50 * KB, 30 * MB)),
        "pdf" => Some((100 * KB, 300 * MB)),
        "cbz" | "cbr" => Some((5 * MB, 1024 * MB)),
        "txt" => Some((KB, 10 * MB)),
        _ => None,
    }
}

fn formats_compatible(requested: &str, actual: &str) -> bool {
    let ebook = ["epub", "mobi", "azw3"];
    let requested = requested.to_ascii_lowercase();
    let actual = actual.to_ascii_lowercase();
    if requested == actual {
        return true;
    }
    ebook.contains(&requested.as_str()) && ebook.contains(&actual.as_str())
}

#[derive(Debug, Clone, Default)]
pub struct ScoringInput<'a> {
    pub format: &'a str,
    pub requested_format: Option<&'a str>,
    pub file_size_bytes: Option<u64>,
    /// Torrent seeders/availability count, if the indexer is a torrent
    /// tracker; `None` for Usenet/Newznab results.
    pub seeders: Option<u32>,
    pub indexer_priority: i32,
    pub author: Option<&'a str>,
    pub description: Option<&'a str>,
    pub cover_url: Option<&'a str>,
    pub language: Option<&'a str>,
}

/// Computes the 0-100 composite `qualityScore`. Pure and deterministic:
/// identical inputs always yield an identical score.
pub fn compute_quality_score(input: &ScoringInput<'_>) -> u8 {
    let format_term = score_format_match(input);
    let size_term = score_size_sanity(input);
    let reputation_term = score_source_reputation(input);
    let completeness_term = score_metadata_completeness(input);

    (format_term + size_term + reputation_term + completeness_term).min(100) as u8
}

fn score_format_match(input: &ScoringInput<'_>) -> u32 {
    match input.requested_format {
        None => 40,
        Some(requested) if requested.eq_ignore_ascii_case(input.format) => 40,
        Some(requested) if formats_compatible(requested, input.format) => 20,
        Some(_) => 0,
    }
}

fn score_size_sanity(input: &ScoringInput<'_>) -> u32 {
    let Some(size) = input.file_size_bytes else {
        return 10;
    };
    match expected_size_range(input.format) {
        Some((min, max)) if size >= min && size <= max => 20,
        Some(_) => 0,
        None => 10,
    }
}

fn score_source_reputation(input: &ScoringInput<'_>) -> u32 {
    if let Some(seeders) = input.seeders {
        return (seeders / 5).min(20);
    }
    input.indexer_priority.clamp(0, 20) as u32
}

fn score_metadata_completeness(input: &ScoringInput<'_>) -> u32 {
    let fields = [
        input.author.filter(|s| !s.is_empty()).is_some(),
        input.description.filter(|s| !s.is_empty()).is_some(),
        input.cover_url.filter(|s| !s.is_empty()).is_some(),
        input.language.filter(|s| !s.is_empty()).is_some(),
    ];
    fields.iter().filter(|present| **present).count() as u32 * 5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> ScoringInput<'static> {
        ScoringInput {
            format: "epub",
            requested_format: Some("epub"),
            file_size_bytes: Some(2 * 1024 * 1024),
            seeders: Some(200),
            indexer_priority: 10,
            author: Some("Frank Herbert"),
            description: Some("A desert planet."),
            cover_url: Some("https://example.com/cover.jpg"),
            language: Some("en"),
        }
    }

    #[test]
    fn perfect_result_scores_100() {
        assert_eq!(compute_quality_score(&full_input()), 100);
    }

    #[test]
    fn score_never_exceeds_100() {
        let mut input = full_input();
        input.seeders = Some(10_000);
        assert!(compute_quality_score(&input) <= 100);
    }

    #[test]
    fn mismatched_format_loses_format_term() {
        let mut input = full_input();
        input.requested_format = Some("pdf");
        input.format = "epub";
        assert!(compute_quality_score(&input) < compute_quality_score(&full_input()));
    }

    #[test]
    fn sparse_metadata_scores_lower() {
        let input = ScoringInput {
            format: "epub",
            requested_format: None,
            file_size_bytes: None,
            seeders: None,
            indexer_priority: 0,
            author: None,
            description: None,
            cover_url: None,
            language: None,
        };
        assert_eq!(compute_quality_score(&input), 40 + 10 + 0 + 0);
    }
}
