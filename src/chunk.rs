use chrono::{Days, NaiveDate};
use tracing::warn;

use crate::domain::DateChunk;

/// Per-request day limit of the FIRMS area API.
pub const MAX_CHUNK_DAYS: u32 = 10;

pub const DEFAULT_CHUNK_DAYS: u32 = 7;

pub fn effective_chunk_days(max_chunk_days: u32) -> u32 {
    max_chunk_days.clamp(1, MAX_CHUNK_DAYS)
}

/// Split `[start_date, end_date]` into contiguous, non-overlapping chunks of at most
/// `min(10, max_chunk_days)` days. Reversed bounds are swapped.
pub fn plan(start_date: NaiveDate, end_date: NaiveDate, max_chunk_days: u32) -> Vec<DateChunk> {
    let (start_date, end_date) = if start_date > end_date {
        warn!(%start_date, %end_date, "start date after end date, swapping");
        (end_date, start_date)
    } else {
        (start_date, end_date)
    };

    let step = Days::new(u64::from(effective_chunk_days(max_chunk_days)) - 1);
    let mut chunks = Vec::new();
    let mut current = start_date;
    loop {
        let chunk_end = current
            .checked_add_days(step)
            .map_or(end_date, |end| end.min(end_date));
        chunks.push(DateChunk::new(current, chunk_end));
        match chunk_end.succ_opt() {
            Some(next) if chunk_end < end_date => current = next,
            _ => break,
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_date;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    fn assert_covers(chunks: &[DateChunk], start: NaiveDate, end: NaiveDate, limit: u32) {
        assert_eq!(chunks.first().unwrap().start, start);
        assert_eq!(chunks.last().unwrap().end, end);
        for chunk in chunks {
            assert!(chunk.start <= chunk.end);
            assert!(chunk.days() <= limit.min(MAX_CHUNK_DAYS));
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
    }

    #[test]
    fn single_day_range() {
        let day = date("2025-03-01");
        let chunks = plan(day, day, 7);
        assert_eq!(chunks, vec![DateChunk::new(day, day)]);
    }

    #[test]
    fn splits_into_weeks() {
        let chunks = plan(date("2025-03-01"), date("2025-03-20"), 7);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], DateChunk::new(date("2025-03-01"), date("2025-03-07")));
        assert_eq!(chunks[2], DateChunk::new(date("2025-03-15"), date("2025-03-20")));
    }

    #[test]
    fn coverage_over_many_sizes() {
        let start = date("2024-12-20");
        for span in [0u64, 1, 6, 9, 10, 11, 30, 75] {
            let end = start.checked_add_days(Days::new(span)).unwrap();
            for limit in [1u32, 3, 7, 10, 14] {
                let chunks = plan(start, end, limit);
                assert_covers(&chunks, start, end, limit);
                let total: u32 = chunks.iter().map(DateChunk::days).sum();
                assert_eq!(total as u64, span + 1);
            }
        }
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let chunks = plan(date("2025-03-10"), date("2025-03-01"), 7);
        assert_covers(&chunks, date("2025-03-01"), date("2025-03-10"), 7);
    }

    #[test]
    fn zero_chunk_days_means_one() {
        let chunks = plan(date("2025-03-01"), date("2025-03-03"), 0);
        assert_eq!(chunks.len(), 3);
    }
}
