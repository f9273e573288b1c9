//! Clone progress stream parsing
//!
//! Git reports clone progress as text on stderr. This parser maps the
//! phase markers and embedded percentages onto one normalized 0-100
//! scale using fixed bands per phase:
//!
//! - enumerating/counting objects:   0-10
//! - compressing objects:           10-25
//! - receiving objects:             25-85
//! - resolving deltas:              85-95
//! - updating files (checkout):     95-100
//!
//! The emitted percentage is monotonic even when git's own counters
//! restart between phases.

use regex::Regex;

/// One normalized progress tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percentage: u8,
    pub phase: &'static str,
}

pub struct CloneProgressParser {
    counting: Regex,
    compressing: Regex,
    receiving: Regex,
    resolving: Regex,
    updating: Regex,
    last: u8,
}

impl CloneProgressParser {
    pub fn new() -> Self {
        Self {
            counting: Regex::new(r"(?i)(?:enumerating|counting) objects:\s*(\d+)%")
                .expect("counting pattern is valid"),
            compressing: Regex::new(r"(?i)compressing objects:\s*(\d+)%")
                .expect("compressing pattern is valid"),
            receiving: Regex::new(r"(?i)receiving objects:\s*(\d+)%")
                .expect("receiving pattern is valid"),
            resolving: Regex::new(r"(?i)resolving deltas:\s*(\d+)%")
                .expect("resolving pattern is valid"),
            updating: Regex::new(r"(?i)updating files:\s*(\d+)%")
                .expect("updating pattern is valid"),
            last: 0,
        }
    }

    /// Returns a normalized update when the line carries progress
    /// information, `None` otherwise.
    pub fn parse_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let (raw, phase, lo, hi) = if let Some(pct) = capture_percent(&self.receiving, line) {
            (pct, "receiving", 25u8, 85u8)
        } else if let Some(pct) = capture_percent(&self.resolving, line) {
            (pct, "resolving-deltas", 85, 95)
        } else if let Some(pct) = capture_percent(&self.compressing, line) {
            (pct, "compressing", 10, 25)
        } else if let Some(pct) = capture_percent(&self.counting, line) {
            (pct, "counting", 0, 10)
        } else if let Some(pct) = capture_percent(&self.updating, line) {
            (pct, "checkout", 95, 100)
        } else if line.contains("Cloning into") {
            (0, "counting", 0, 10)
        } else {
            return None;
        };

        let scaled = scale(raw, lo, hi);
        // Phases overlap in git's output; never walk the bar backwards.
        let percentage = scaled.max(self.last);
        self.last = percentage;
        Some(ProgressUpdate { percentage, phase })
    }
}

impl Default for CloneProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_percent(re: &Regex, line: &str) -> Option<u32> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

fn scale(pct: u32, lo: u8, hi: u8) -> u8 {
    let pct = pct.min(100);
    lo + ((pct * (hi - lo) as u32) / 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiving_maps_to_25_85_band() {
        let mut parser = CloneProgressParser::new();

        let start = parser
            .parse_line("Receiving objects:   0% (0/1424)")
            .unwrap();
        assert_eq!(start.percentage, 25);
        assert_eq!(start.phase, "receiving");

        let half = parser
            .parse_line("Receiving objects:  50% (712/1424), 1.2 MiB | 2.4 MiB/s")
            .unwrap();
        assert_eq!(half.percentage, 55);

        let done = parser
            .parse_line("Receiving objects: 100% (1424/1424), done.")
            .unwrap();
        assert_eq!(done.percentage, 85);
    }

    #[test]
    fn test_resolving_deltas_maps_to_85_95_band() {
        let mut parser = CloneProgressParser::new();
        let update = parser
            .parse_line("Resolving deltas:  50% (300/600)")
            .unwrap();
        assert_eq!(update.percentage, 90);
        assert_eq!(update.phase, "resolving-deltas");
    }

    #[test]
    fn test_remote_prefixed_counting_lines() {
        let mut parser = CloneProgressParser::new();
        let update = parser
            .parse_line("remote: Enumerating objects: 60%, done.")
            .unwrap();
        assert_eq!(update.phase, "counting");
        assert_eq!(update.percentage, 6);

        let update = parser
            .parse_line("remote: Compressing objects: 100% (50/50), done.")
            .unwrap();
        assert_eq!(update.phase, "compressing");
        assert_eq!(update.percentage, 25);
    }

    #[test]
    fn test_monotonic_across_phase_restarts() {
        let mut parser = CloneProgressParser::new();
        parser
            .parse_line("Receiving objects: 100% (10/10), done.")
            .unwrap();
        // Compressing restarts at 0% but the bar must not move backwards.
        let update = parser
            .parse_line("remote: Compressing objects: 0% (0/50)")
            .unwrap();
        assert_eq!(update.percentage, 85);
    }

    #[test]
    fn test_non_progress_lines_ignored() {
        let mut parser = CloneProgressParser::new();
        assert!(parser.parse_line("warning: redirecting to https").is_none());
        assert!(parser.parse_line("").is_none());
        assert!(
            parser
                .parse_line("Receiving objects: garbage% (x/y)")
                .is_none()
        );
    }

    #[test]
    fn test_clone_banner_starts_at_zero() {
        let mut parser = CloneProgressParser::new();
        let update = parser.parse_line("Cloning into 'workdir'...").unwrap();
        assert_eq!(update.percentage, 0);
    }
}
