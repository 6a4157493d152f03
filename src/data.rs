use ndarray::{Array1, ArrayView1};
use crate::error::{Result, SurvivalError};

/// lifetime data - durations plus the censoring indicator
#[derive(Debug, Clone)]
pub struct LifetimeData {
    durations: Array1<f64>, // time to event/censoring
    observed: Array1<bool>, // true = event, false = right-censored
}

impl LifetimeData {
    /// make new lifetime data from raw vecs
    pub fn new(
        durations: Vec<f64>, // event/censoring times
        observed: Vec<bool>, // true = event occurred, false = censored
    ) -> Result<Self> {
        let n_samples = durations.len();

        if observed.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "durations len ({}) != observed len ({})",
                n_samples,
                observed.len()
            )));
        }

        if n_samples == 0 {
            return Err(SurvivalError::invalid_survival_data("no observations"));
        }

        if durations.iter().any(|&t| t <= 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "durations must be positive & finite",
            ));
        }

        Ok(Self {
            durations: Array1::from(durations),
            observed: Array1::from(observed),
        })
    }

    /// every duration is an observed event (no censoring)
    pub fn uncensored(durations: Vec<f64>) -> Result<Self> {
        let observed = vec![true; durations.len()];
        Self::new(durations, observed)
    }

    pub fn n_samples(&self) -> usize {
        self.durations.len()
    }

    pub fn n_events(&self) -> usize {
        self.observed.iter().filter(|&&e| e).count()
    }

    pub fn n_censored(&self) -> usize {
        self.n_samples() - self.n_events()
    }

    /// event/censoring times
    pub fn durations(&self) -> ArrayView1<'_, f64> {
        self.durations.view()
    }

    /// censoring indicator (true = event, false = censored)
    pub fn observed(&self) -> ArrayView1<'_, bool> {
        self.observed.view()
    }

    /// (duration, observed) pairs in input order
    pub fn iter(&self) -> impl Iterator<Item = (f64, bool)> + '_ {
        self.durations
            .iter()
            .copied()
            .zip(self.observed.iter().copied())
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .iter()
            .filter_map(|(t, e)| if e { Some(t) } else { None })
            .collect();

        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// how many are still at risk just before `t`
    pub fn at_risk(&self, t: f64) -> usize {
        self.durations.iter().filter(|&&d| d >= t).count()
    }

    /// events recorded exactly at `t`
    pub fn events_at(&self, t: f64) -> usize {
        self.iter().filter(|&(d, e)| e && d == t).count()
    }

    /// total time on study
    pub fn total_exposure(&self) -> f64 {
        self.durations.sum()
    }

    pub fn max_duration(&self) -> f64 {
        self.durations.fold(0.0_f64, |acc, &t| acc.max(t))
    }

    /// grab a subset of observations by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SurvivalError::invalid_dimensions("subset index out of bounds"));
        }

        let durations: Vec<f64> = indices.iter().map(|&i| self.durations[i]).collect();
        let observed: Vec<bool> = indices.iter().map(|&i| self.observed[i]).collect();

        Self::new(durations, observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_data() -> LifetimeData {
        let durations = vec![1.0, 2.0, 3.0, 3.0, 5.0];
        let observed = vec![true, false, true, true, false];

        LifetimeData::new(durations, observed).unwrap()
    }

    #[test]
    fn test_lifetime_data_creation() {
        let data = create_test_data();
        assert_eq!(data.n_samples(), 5);
        assert_eq!(data.n_events(), 3);
        assert_eq!(data.n_censored(), 2);
        assert_eq!(data.event_times(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_invalid_dimensions() {
        let durations = vec![1.0, 2.0];
        let observed = vec![true]; // wrong length

        assert!(matches!(
            LifetimeData::new(durations, observed),
            Err(SurvivalError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_invalid_durations() {
        assert!(LifetimeData::new(vec![-1.0, 2.0], vec![true, false]).is_err());
        assert!(LifetimeData::new(vec![0.0, 2.0], vec![true, false]).is_err());
        assert!(LifetimeData::new(vec![f64::NAN], vec![true]).is_err());
        assert!(LifetimeData::new(vec![f64::INFINITY], vec![false]).is_err());
        assert!(LifetimeData::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_risk_set_counts() {
        let data = create_test_data();
        assert_eq!(data.at_risk(1.0), 5);
        assert_eq!(data.at_risk(3.0), 3);
        assert_eq!(data.at_risk(5.5), 0);
        assert_eq!(data.events_at(3.0), 2);
        assert_eq!(data.events_at(2.0), 0); // censored, not an event
    }

    #[test]
    fn test_exposure() {
        let data = create_test_data();
        assert_relative_eq!(data.total_exposure(), 14.0, epsilon = 1e-12);
        assert_relative_eq!(data.max_duration(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uncensored() {
        let data = LifetimeData::uncensored(vec![0.5, 1.5]).unwrap();
        assert_eq!(data.n_events(), 2);
        assert_eq!(data.n_censored(), 0);
    }

    #[test]
    fn test_subset() {
        let data = create_test_data();
        let subset = data.subset(&[0, 2, 4]).unwrap();

        assert_eq!(subset.n_samples(), 3);
        assert_eq!(subset.durations()[0], 1.0);
        assert_eq!(subset.durations()[1], 3.0);
        assert_eq!(subset.durations()[2], 5.0);
        assert_eq!(subset.observed()[2], false);

        assert!(data.subset(&[7]).is_err());
    }
}
