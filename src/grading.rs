use serde::Serialize;

use crate::errors::{EngineError, EngineResult};

/// Continuous-assessment component ceiling.
pub const MAX_CA_SCORE: f64 = 40.0;
/// Examination component ceiling.
pub const MAX_EXAM_SCORE: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: &'static str,
    pub grade_point: f64,
    pub remark: &'static str,
}

/// Maps a total score to its grade band. Total, pure, and strict about its
/// domain: callers must reject out-of-range components before combining
/// them, this never clamps.
///
/// Bands are upper-bound inclusive, evaluated top-down, so a fractional
/// total such as 69.5 still lands in the band below the next threshold.
pub fn classify(total_score: f64) -> EngineResult<GradeBand> {
    if !total_score.is_finite() || !(0.0..=100.0).contains(&total_score) {
        return Err(EngineError::validation(format!(
            "total score {} is outside [0, 100]",
            total_score
        )));
    }

    let band = if total_score >= 70.0 {
        GradeBand {
            grade: "A",
            grade_point: 5.0,
            remark: "Excellent",
        }
    } else if total_score >= 60.0 {
        GradeBand {
            grade: "B",
            grade_point: 4.0,
            remark: "Very Good",
        }
    } else if total_score >= 50.0 {
        GradeBand {
            grade: "C",
            grade_point: 3.0,
            remark: "Good",
        }
    } else if total_score >= 45.0 {
        GradeBand {
            grade: "D",
            grade_point: 2.0,
            remark: "Fair",
        }
    } else if total_score >= 40.0 {
        GradeBand {
            grade: "E",
            grade_point: 1.0,
            remark: "Pass",
        }
    } else {
        GradeBand {
            grade: "F",
            grade_point: 0.0,
            remark: "Fail",
        }
    };

    Ok(band)
}

/// Degree classification. Derived from CGPA at display time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    FirstClass,
    SecondClassUpper,
    SecondClassLower,
    ThirdClass,
    Pass,
    Fail,
}

impl Classification {
    pub fn from_cgpa(cgpa: f64) -> Classification {
        if cgpa >= 4.50 {
            Classification::FirstClass
        } else if cgpa >= 3.50 {
            Classification::SecondClassUpper
        } else if cgpa >= 2.40 {
            Classification::SecondClassLower
        } else if cgpa >= 1.50 {
            Classification::ThirdClass
        } else if cgpa >= 1.00 {
            Classification::Pass
        } else {
            Classification::Fail
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::FirstClass => "First Class",
            Classification::SecondClassUpper => "Second Class Upper",
            Classification::SecondClassLower => "Second Class Lower",
            Classification::ThirdClass => "Third Class",
            Classification::Pass => "Pass",
            Classification::Fail => "Fail",
        }
    }
}

pub fn academic_standing(cgpa: f64) -> &'static str {
    if cgpa >= 1.00 {
        "Good Standing"
    } else {
        "Probation"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaTotals {
    pub total_credit_units: i64,
    pub total_grade_points: f64,
    pub gpa: f64,
}

/// Credit-weighted grade-point average over graded registrations. `None`
/// when no credit was carried: an undefined GPA is the absence of a record,
/// never a zero.
pub fn weighted_gpa<I>(items: I) -> Option<GpaTotals>
where
    I: IntoIterator<Item = (f64, i64)>,
{
    let mut total_credit_units: i64 = 0;
    let mut total_grade_points: f64 = 0.0;

    for (grade_point, credit_units) in items {
        total_credit_units += credit_units;
        total_grade_points += grade_point * credit_units as f64;
    }

    if total_credit_units <= 0 {
        return None;
    }

    Some(GpaTotals {
        total_credit_units,
        total_grade_points,
        gpa: total_grade_points / total_credit_units as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_the_whole_domain() {
        let cases = [
            (0.0, "F", 0.0, "Fail"),
            (39.0, "F", 0.0, "Fail"),
            (39.9, "F", 0.0, "Fail"),
            (40.0, "E", 1.0, "Pass"),
            (44.0, "E", 1.0, "Pass"),
            (45.0, "D", 2.0, "Fair"),
            (49.0, "D", 2.0, "Fair"),
            (50.0, "C", 3.0, "Good"),
            (59.0, "C", 3.0, "Good"),
            (60.0, "B", 4.0, "Very Good"),
            (69.0, "B", 4.0, "Very Good"),
            (69.5, "B", 4.0, "Very Good"),
            (70.0, "A", 5.0, "Excellent"),
            (100.0, "A", 5.0, "Excellent"),
        ];
        for (total, grade, point, remark) in cases {
            let band = classify(total).expect("in range");
            assert_eq!(band.grade, grade, "total {}", total);
            assert_eq!(band.grade_point, point, "total {}", total);
            assert_eq!(band.remark, remark, "total {}", total);
        }
    }

    #[test]
    fn classify_rejects_out_of_range() {
        assert!(classify(-0.1).is_err());
        assert!(classify(100.1).is_err());
        assert!(classify(f64::NAN).is_err());
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(Classification::from_cgpa(5.0), Classification::FirstClass);
        assert_eq!(Classification::from_cgpa(4.50), Classification::FirstClass);
        assert_eq!(
            Classification::from_cgpa(4.49),
            Classification::SecondClassUpper
        );
        assert_eq!(
            Classification::from_cgpa(3.60).label(),
            "Second Class Upper"
        );
        assert_eq!(
            Classification::from_cgpa(2.40),
            Classification::SecondClassLower
        );
        assert_eq!(Classification::from_cgpa(1.50), Classification::ThirdClass);
        assert_eq!(Classification::from_cgpa(1.00), Classification::Pass);
        assert_eq!(Classification::from_cgpa(0.80).label(), "Fail");
    }

    #[test]
    fn standing_splits_at_one_point_zero() {
        assert_eq!(academic_standing(1.00), "Good Standing");
        assert_eq!(academic_standing(0.99), "Probation");
        assert_eq!(academic_standing(0.80), "Probation");
    }

    #[test]
    fn weighted_gpa_matches_worked_example() {
        // 3 units at A (5.0) plus 2 units at C (3.0) => 21/5 = 4.2.
        let totals = weighted_gpa([(5.0, 3), (3.0, 2)]).expect("has credit");
        assert_eq!(totals.total_credit_units, 5);
        assert!((totals.total_grade_points - 21.0).abs() < 1e-9);
        assert!((totals.gpa - 4.2).abs() < 1e-9);
    }

    #[test]
    fn weighted_gpa_is_none_with_no_credit() {
        assert_eq!(weighted_gpa(std::iter::empty::<(f64, i64)>()), None);
    }
}
