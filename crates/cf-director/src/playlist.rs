//! Music playlist
//!
//! Ordered or shuffled track advance for the single music voice. Shuffle
//! keeps a history of played indices and disallows re-picking recent ones;
//! in a non-looping playlist the disallow window covers everything already
//! played, so advancing terminates cleanly once every track has run.

use cf_core::Seconds;
use rand::Rng;
use smallvec::SmallVec;

/// Track order state for the music voice
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<String>,
    /// Played indices, oldest first
    history: Vec<usize>,
    current: Option<usize>,
    looping: bool,
    shuffle: bool,
    crossfade_secs: Seconds,
}

impl Playlist {
    pub fn new<I, S>(tracks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracks: tracks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_crossfade(mut self, seconds: Seconds) -> Self {
        self.crossfade_secs = seconds.max(0.0);
        self
    }

    /// Append a track to the end of the playlist
    pub fn enqueue(&mut self, track: impl Into<String>) {
        self.tracks.push(track.into());
    }

    /// Sound id of the current track
    pub fn current(&self) -> Option<&str> {
        self.current.map(|i| self.tracks[i].as_str())
    }

    #[inline]
    pub fn crossfade_secs(&self) -> Seconds {
        self.crossfade_secs
    }

    #[inline]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Forget history and current position, as if never played
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = None;
    }

    /// Advance to the next track; `None` when the playlist is exhausted
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let chosen = if self.shuffle {
            self.next_shuffled(rng)?
        } else {
            match self.current {
                None => 0,
                Some(i) if i + 1 < self.tracks.len() => i + 1,
                Some(_) if self.looping => 0,
                Some(_) => return None,
            }
        };
        self.history.push(chosen);
        self.current = Some(chosen);
        Some(chosen)
    }

    /// Step back to the previous track
    ///
    /// In shuffle mode this walks the history rather than re-rolling.
    pub fn previous(&mut self) -> Option<usize> {
        if self.shuffle {
            if self.history.len() < 2 {
                return None;
            }
            self.history.pop();
            let previous = *self.history.last()?;
            self.current = Some(previous);
            return Some(previous);
        }
        let chosen = match self.current? {
            0 if self.looping => self.tracks.len() - 1,
            0 => return None,
            i => i - 1,
        };
        self.current = Some(chosen);
        Some(chosen)
    }

    fn next_shuffled<R: Rng>(&mut self, rng: &mut R) -> Option<usize> {
        let n = self.tracks.len();
        let window = if self.looping {
            // Always leave at least one candidate.
            self.history.len().min(n - 1)
        } else {
            if self.history.len() >= n {
                return None;
            }
            self.history.len()
        };
        let recent = &self.history[self.history.len() - window..];

        let candidates: SmallVec<[usize; 16]> =
            (0..n).filter(|i| !recent.contains(i)).collect();
        Some(candidates[rng.random_range(0..candidates.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn five_tracks() -> Playlist {
        Playlist::new(["t0", "t1", "t2", "t3", "t4"])
    }

    #[test]
    fn test_ordered_advance_and_exhaustion() {
        let mut playlist = five_tracks();
        let mut rng = rng();

        for expected in 0..5 {
            assert_eq!(playlist.next(&mut rng), Some(expected));
        }
        assert_eq!(playlist.next(&mut rng), None);
        assert_eq!(playlist.current(), Some("t4"));
    }

    #[test]
    fn test_ordered_looping_wraps() {
        let mut playlist = five_tracks().with_looping(true);
        let mut rng = rng();

        for _ in 0..5 {
            playlist.next(&mut rng);
        }
        assert_eq!(playlist.next(&mut rng), Some(0));
        assert_eq!(playlist.previous(), Some(4));
    }

    #[test]
    fn test_ordered_previous() {
        let mut playlist = five_tracks();
        let mut rng = rng();
        playlist.next(&mut rng);
        playlist.next(&mut rng);

        assert_eq!(playlist.previous(), Some(0));
        assert_eq!(playlist.previous(), None);
    }

    #[test]
    fn test_shuffle_plays_all_distinct_then_ends() {
        let mut playlist = five_tracks().with_shuffle(true);
        let mut rng = rng();

        let mut seen = HashSet::new();
        for _ in 0..5 {
            let index = playlist.next(&mut rng).unwrap();
            assert!(seen.insert(index));
        }
        assert_eq!(playlist.next(&mut rng), None);
    }

    #[test]
    fn test_shuffle_looping_avoids_recent_repeats() {
        let mut playlist = Playlist::new(["a", "b", "c"])
            .with_shuffle(true)
            .with_looping(true);
        let mut rng = rng();

        let mut last = playlist.next(&mut rng).unwrap();
        for _ in 0..200 {
            let next = playlist.next(&mut rng).unwrap();
            assert_ne!(next, last);
            last = next;
        }
    }

    #[test]
    fn test_shuffle_previous_walks_history() {
        let mut playlist = five_tracks().with_shuffle(true);
        let mut rng = rng();

        let first = playlist.next(&mut rng).unwrap();
        let _second = playlist.next(&mut rng).unwrap();

        assert_eq!(playlist.previous(), Some(first));
        assert_eq!(playlist.previous(), None);
    }

    #[test]
    fn test_reset_allows_replay() {
        let mut playlist = five_tracks().with_shuffle(true);
        let mut rng = rng();

        while playlist.next(&mut rng).is_some() {}
        playlist.reset();
        assert!(playlist.next(&mut rng).is_some());
    }

    #[test]
    fn test_enqueue_extends_exhausted_playlist() {
        let mut playlist = Playlist::new(["only"]);
        let mut rng = rng();

        assert_eq!(playlist.next(&mut rng), Some(0));
        assert_eq!(playlist.next(&mut rng), None);

        playlist.enqueue("more");
        assert_eq!(playlist.next(&mut rng), Some(1));
    }
}
