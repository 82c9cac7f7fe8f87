//! Axis selections used to derive dataset views.

use std::fmt;

use crate::covariates::CovariateRow;

type SamplePredicate = Box<dyn Fn(&CovariateRow<'_>) -> bool>;
type FeaturePredicate = Box<dyn Fn(&str) -> bool>;

/// Which samples (expression columns / covariate rows) to keep, in order.
pub enum SampleSelection {
    All,
    Positions(Vec<usize>),
    Ids(Vec<String>),
    Matching(SamplePredicate),
}

impl SampleSelection {
    pub fn positions(positions: impl IntoIterator<Item = usize>) -> Self {
        SampleSelection::Positions(positions.into_iter().collect())
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SampleSelection::Ids(ids.into_iter().map(Into::into).collect())
    }

    /// Keep samples whose covariate row satisfies `predicate`, in dataset order.
    pub fn matching(predicate: impl Fn(&CovariateRow<'_>) -> bool + 'static) -> Self {
        SampleSelection::Matching(Box::new(predicate))
    }
}

impl fmt::Debug for SampleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSelection::All => write!(f, "All"),
            SampleSelection::Positions(positions) => {
                f.debug_tuple("Positions").field(positions).finish()
            }
            SampleSelection::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            SampleSelection::Matching(_) => write!(f, "Matching(<predicate>)"),
        }
    }
}

/// Which features (expression rows) to keep, in order.
pub enum FeatureSelection {
    All,
    Positions(Vec<usize>),
    Ids(Vec<String>),
    Matching(FeaturePredicate),
}

impl FeatureSelection {
    pub fn positions(positions: impl IntoIterator<Item = usize>) -> Self {
        FeatureSelection::Positions(positions.into_iter().collect())
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureSelection::Ids(ids.into_iter().map(Into::into).collect())
    }

    /// Keep features whose identifier satisfies `predicate`, in dataset order.
    pub fn matching(predicate: impl Fn(&str) -> bool + 'static) -> Self {
        FeatureSelection::Matching(Box::new(predicate))
    }
}

impl fmt::Debug for FeatureSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSelection::All => write!(f, "All"),
            FeatureSelection::Positions(positions) => {
                f.debug_tuple("Positions").field(positions).finish()
            }
            FeatureSelection::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            FeatureSelection::Matching(_) => write!(f, "Matching(<predicate>)"),
        }
    }
}
