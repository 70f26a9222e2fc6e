#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlotResult {
    pub phase_one_time: Option<f64>,
    pub phase_two_time: Option<f64>,
    pub phase_three_time: Option<f64>,
    pub phase_four_time: Option<f64>,
    pub total_time: Option<f64>,
    pub copy_time: Option<f64>,
}

impl PlotResult {
    pub fn with_phase_time(phase: u8, seconds: f64) -> Option<Self> {
        let mut result = Self::default();
        match phase {
            1 => result.phase_one_time = Some(seconds),
            2 => result.phase_two_time = Some(seconds),
            3 => result.phase_three_time = Some(seconds),
            4 => result.phase_four_time = Some(seconds),
            _ => return None,
        }
        Some(result)
    }

    pub fn with_total_time(seconds: f64) -> Self {
        Self {
            total_time: Some(seconds),
            ..Self::default()
        }
    }

    pub fn with_copy_time(seconds: f64) -> Self {
        Self {
            copy_time: Some(seconds),
            ..Self::default()
        }
    }

    /// Combines `self` with a later observation. Fields set in `later`
    /// overwrite ours; fields it leaves unset keep our value.
    pub fn merge(&self, later: &PlotResult) -> PlotResult {
        PlotResult {
            phase_one_time: later.phase_one_time.or(self.phase_one_time),
            phase_two_time: later.phase_two_time.or(self.phase_two_time),
            phase_three_time: later.phase_three_time.or(self.phase_three_time),
            phase_four_time: later.phase_four_time.or(self.phase_four_time),
            total_time: later.total_time.or(self.total_time),
            copy_time: later.copy_time.or(self.copy_time),
        }
    }

    pub fn phase_time(&self, phase: u8) -> Option<f64> {
        match phase {
            1 => self.phase_one_time,
            2 => self.phase_two_time,
            3 => self.phase_three_time,
            4 => self.phase_four_time,
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_fields_merge_in_either_order() {
        let one = PlotResult::with_phase_time(1, 10.0).unwrap();
        let two = PlotResult::with_phase_time(2, 20.0).unwrap();

        let forward = PlotResult::default().merge(&one).merge(&two);
        let reverse = PlotResult::default().merge(&two).merge(&one);

        assert_eq!(forward, reverse);
        assert_eq!(forward.phase_one_time, Some(10.0));
        assert_eq!(forward.phase_two_time, Some(20.0));
        assert_eq!(forward.total_time, None);
    }

    #[test]
    fn later_value_wins_for_shared_field() {
        let first = PlotResult::with_total_time(100.0);
        let second = PlotResult::with_total_time(120.0);

        assert_eq!(first.merge(&second).total_time, Some(120.0));
        assert_eq!(second.merge(&first).total_time, Some(100.0));
    }

    #[test]
    fn unset_field_does_not_erase_earlier_value() {
        let acc = PlotResult::with_copy_time(5.5);
        let merged = acc.merge(&PlotResult::default());
        assert_eq!(merged.copy_time, Some(5.5));
    }

    #[test]
    fn unknown_phase_is_rejected() {
        assert!(PlotResult::with_phase_time(0, 1.0).is_none());
        assert!(PlotResult::with_phase_time(5, 1.0).is_none());
        assert!(PlotResult::default().is_empty());
    }
}
