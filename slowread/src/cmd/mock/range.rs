/// A parsed `Range` request header, for a resource of known size.
///
/// Only a single `bytes=` range is understood;
/// anything else is ignored and the full resource is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ByteRange {
    Ignored,
    /// Inclusive on both ends.
    Satisfiable { start: usize, end: usize },
    Unsatisfiable,
}

impl ByteRange {
    pub(super) fn parse(value: &str, size: usize) -> Self {
        let Some(ranges) = value.trim().strip_prefix("bytes=") else {
            return Self::Ignored;
        };
        if ranges.contains(',') {
            return Self::Ignored;
        }
        let Some((first, last)) = ranges.split_once('-') else {
            return Self::Ignored;
        };
        let (first, last) = (first.trim(), last.trim());

        // suffix range: the last N bytes
        if first.is_empty() {
            return match last.parse::<usize>() {
                Ok(0) => Self::Unsatisfiable,
                Ok(_) if size == 0 => Self::Unsatisfiable,
                Ok(n) => Self::Satisfiable {
                    start: size.saturating_sub(n),
                    end: size - 1,
                },
                Err(_) => Self::Ignored,
            };
        }

        let Ok(start) = first.parse::<usize>() else {
            return Self::Ignored;
        };
        if start >= size {
            return Self::Unsatisfiable;
        }

        let end = if last.is_empty() {
            size - 1
        } else {
            match last.parse::<usize>() {
                Ok(end) if end < start => return Self::Ignored,
                Ok(end) => end.min(size - 1),
                Err(_) => return Self::Ignored,
            }
        };

        Self::Satisfiable { start, end }
    }
}
