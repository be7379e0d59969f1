use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::DrmsError;

/// Identifier of a single job, as assigned by the scheduler backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Indices `start, start + step, ...` not exceeding `end`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkRange {
    start: u32,
    end: u32,
    step: u32,
}

impl BulkRange {
    pub fn new(start: u32, end: u32, step: u32) -> crate::Result<BulkRange> {
        if step == 0 {
            return Err(DrmsError::InvalidRange(format!(
                "step of {start}-{end} must be positive"
            )));
        }
        if start > end {
            return Err(DrmsError::InvalidRange(format!(
                "start {start} is larger than end {end}"
            )));
        }
        if (end - start) / step == u32::MAX {
            return Err(DrmsError::InvalidRange(format!(
                "{start}-{end}:{step} has too many indices"
            )));
        }
        Ok(BulkRange { start, end, step })
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// The last index actually produced by the range.
    pub fn last(&self) -> u32 {
        self.start + (self.count() - 1) * self.step
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + use<> {
        (self.start..=self.end).step_by(self.step as usize)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        (self.end - self.start) / self.step + 1
    }

    pub fn contains(&self, value: u32) -> bool {
        self.start <= value && value <= self.end && ((value - self.start) % self.step == 0)
    }
}

impl fmt::Display for BulkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else if self.step == 1 {
            write!(f, "{}-{}", self.start, self.end)
        } else {
            write!(f, "{}-{}:{}", self.start, self.end, self.step)
        }
    }
}

/// Result of a bulk submission: the requested range and one job id per produced index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BulkJobId {
    range: BulkRange,
    tasks: Vec<JobId>,
}

impl BulkJobId {
    pub fn new(range: BulkRange, tasks: Vec<JobId>) -> crate::Result<Self> {
        if tasks.len() != range.count() as usize {
            return Err(DrmsError::BackendProtocolError(format!(
                "bulk submission {range} produced {} job ids instead of {}",
                tasks.len(),
                range.count()
            )));
        }
        Ok(Self { range, tasks })
    }

    #[inline]
    pub fn range(&self) -> BulkRange {
        self.range
    }

    #[inline]
    pub fn task_ids(&self) -> &[JobId] {
        &self.tasks
    }

    /// Pairs of (bulk index, job id).
    pub fn iter(&self) -> impl Iterator<Item = (u32, &JobId)> {
        self.range.iter().zip(self.tasks.iter())
    }

    pub fn task(&self, index: u32) -> Option<&JobId> {
        if !self.range.contains(index) {
            return None;
        }
        let position = (index - self.range.start) / self.range.step;
        self.tasks.get(position as usize)
    }
}

/// Identifies the job(s) an operation applies to.
///
/// Submission only ever returns `Single` or `Bulk`; `AllOfSession` is accepted by control,
/// wait and synchronize as a shorthand for every job the session submitted and did not
/// reap yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum JobIdentifier {
    Single(JobId),
    Bulk(BulkJobId),
    AllOfSession,
}

impl JobIdentifier {
    #[inline]
    pub fn is_session_sentinel(&self) -> bool {
        matches!(self, JobIdentifier::AllOfSession)
    }

    /// Job ids named explicitly by the identifier. `None` for the session sentinel.
    pub fn explicit_ids(&self) -> Option<&[JobId]> {
        match self {
            JobIdentifier::Single(id) => Some(std::slice::from_ref(id)),
            JobIdentifier::Bulk(bulk) => Some(bulk.task_ids()),
            JobIdentifier::AllOfSession => None,
        }
    }

    pub fn as_single(&self) -> Option<&JobId> {
        match self {
            JobIdentifier::Single(id) => Some(id),
            _ => None,
        }
    }
}

impl From<JobId> for JobIdentifier {
    fn from(id: JobId) -> Self {
        JobIdentifier::Single(id)
    }
}

impl From<BulkJobId> for JobIdentifier {
    fn from(bulk: BulkJobId) -> Self {
        JobIdentifier::Bulk(bulk)
    }
}

impl fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobIdentifier::Single(id) => id.fmt(f),
            JobIdentifier::Bulk(bulk) => {
                for (idx, id) in bulk.task_ids().iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    id.fmt(f)?;
                }
                Ok(())
            }
            JobIdentifier::AllOfSession => f.write_str("<all session jobs>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_iterate() {
        assert_eq!(
            BulkRange::new(1, 10, 2).unwrap().iter().collect::<Vec<_>>(),
            vec![1, 3, 5, 7, 9]
        );
        assert_eq!(
            BulkRange::new(2, 11, 3).unwrap().iter().collect::<Vec<_>>(),
            vec![2, 5, 8, 11]
        );
        assert_eq!(
            BulkRange::new(4, 4, 1).unwrap().iter().collect::<Vec<_>>(),
            vec![4]
        );
    }

    #[test]
    fn range_count_and_last() {
        let range = BulkRange::new(1, 10, 2).unwrap();
        assert_eq!(range.count(), 5);
        assert_eq!(range.last(), 9);
        assert_eq!(BulkRange::new(0, 0, 7).unwrap().count(), 1);
    }

    #[test]
    fn range_count_fits() {
        assert!(matches!(
            BulkRange::new(0, u32::MAX, 1),
            Err(DrmsError::InvalidRange(_))
        ));
        assert_eq!(BulkRange::new(1, u32::MAX, 1).unwrap().count(), u32::MAX);
        assert_eq!(BulkRange::new(0, u32::MAX, 2).unwrap().count(), 1 << 31);
    }

    #[test]
    fn range_invalid() {
        assert!(matches!(
            BulkRange::new(10, 1, 2),
            Err(DrmsError::InvalidRange(_))
        ));
        assert!(matches!(
            BulkRange::new(1, 10, 0),
            Err(DrmsError::InvalidRange(_))
        ));
    }

    #[test]
    fn range_contains() {
        let range = BulkRange::new(1, 8, 3).unwrap();
        assert!(range.contains(1));
        assert!(!range.contains(2));
        assert!(range.contains(4));
        assert!(range.contains(7));
        assert!(!range.contains(8));
        assert!(!range.contains(10));
    }

    #[test]
    fn range_display() {
        assert_eq!(BulkRange::new(1, 10, 2).unwrap().to_string(), "1-10:2");
        assert_eq!(BulkRange::new(1, 10, 1).unwrap().to_string(), "1-10");
        assert_eq!(BulkRange::new(3, 3, 1).unwrap().to_string(), "3");
    }

    #[test]
    fn bulk_id_lookup() {
        let range = BulkRange::new(1, 5, 2).unwrap();
        let bulk = BulkJobId::new(range, vec!["1.1".into(), "1.3".into(), "1.5".into()]).unwrap();
        assert_eq!(bulk.task(3), Some(&JobId::from("1.3")));
        assert_eq!(bulk.task(2), None);
        assert_eq!(
            bulk.iter().map(|(index, _)| index).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }

    #[test]
    fn bulk_id_count_mismatch() {
        let range = BulkRange::new(1, 5, 2).unwrap();
        assert!(matches!(
            BulkJobId::new(range, vec!["1.1".into()]),
            Err(DrmsError::BackendProtocolError(_))
        ));
    }
}
