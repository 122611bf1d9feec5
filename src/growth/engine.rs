use serde::Serialize;
use thiserror::Error;

use crate::growth::activity::ActivityKind;
use crate::growth::level::{LevelCurve, MAX_LEVEL};

pub type GrowthResult<T> = core::result::Result<T, GrowthError>;

#[derive(Debug, Error, PartialEq)]
pub enum GrowthError {
    #[error("no nutrients left in the family stock")]
    NutrientExhausted,
}

/// Mutable portion of a plant row, detached from storage so the
/// transition math stays pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantState {
    pub level: i32,
    pub experience_point: i64,
    pub nutrient_count: i32,
    pub nutrient_active: bool,
}

/// What one completed activity did to the plant, for the caller and the
/// fan-out channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthOutcome {
    pub points: i64,
    pub level: i32,
    pub experience_point: i64,
    pub leveled_up: bool,
    pub is_completed: bool,
    pub nutrient_count: i32,
    pub nutrient_active: bool,
}

/// Applies one completed activity to the plant.
///
/// Feeding consumes a nutrient from the stock and arms the multiplier for
/// the next point grant; attendance restocks one. Surplus experience
/// carries across level-ups, and the level stops at [`MAX_LEVEL`]. The
/// stored experience stays below the current threshold everywhere outside
/// this function.
pub fn apply(
    state: &PlantState,
    kind: ActivityKind,
    member_count: i64,
    curve: &LevelCurve,
) -> GrowthResult<(PlantState, GrowthOutcome)> {
    let mut next = state.clone();

    match kind {
        ActivityKind::Nutrient => {
            if next.nutrient_count <= 0 {
                return Err(GrowthError::NutrientExhausted);
            }
            next.nutrient_count -= 1;
        }
        ActivityKind::Attendance => next.nutrient_count += 1,
        _ => (),
    }

    let mut points = kind.base_points();
    if next.nutrient_active {
        points *= 2;
        next.nutrient_active = false;
    }

    let from_level = next.level;
    next.experience_point += points;

    loop {
        let threshold = curve.threshold(member_count, next.level);
        if threshold == 0 || next.experience_point < threshold {
            break;
        }

        next.experience_point -= threshold;
        next.level += 1;
    }

    if kind == ActivityKind::Nutrient {
        next.nutrient_active = true;
    }

    let outcome = GrowthOutcome {
        points,
        level: next.level,
        experience_point: next.experience_point,
        leveled_up: next.level > from_level,
        is_completed: next.level >= MAX_LEVEL,
        nutrient_count: next.nutrient_count,
        nutrient_active: next.nutrient_active,
    };

    Ok((next, outcome))
}

#[cfg(test)]
mod test {
    use super::*;

    fn seedling() -> PlantState {
        PlantState {
            level: 1,
            experience_point: 0,
            nutrient_count: 0,
            nutrient_active: false,
        }
    }

    #[test]
    fn test_points_accumulate_below_threshold() {
        let curve = LevelCurve::default();
        let (next, outcome) = apply(&seedling(), ActivityKind::Water, 3, &curve).unwrap();

        assert_eq!(outcome.points, 10);
        assert_eq!(next.level, 1);
        assert_eq!(next.experience_point, 10);
        assert!(!outcome.leveled_up);
        assert!(!outcome.is_completed);
    }

    #[test]
    fn test_surplus_carries_across_level_up() {
        let curve = LevelCurve::default();
        // family of 3 needs 125 to leave level 1
        let state = PlantState {
            experience_point: 120,
            ..seedling()
        };

        let (next, outcome) = apply(&state, ActivityKind::Quiz, 3, &curve).unwrap();

        assert_eq!(next.level, 2);
        assert_eq!(next.experience_point, 10);
        assert!(outcome.leveled_up);
    }

    #[test]
    fn test_level_caps_at_five() {
        let curve = LevelCurve::new(2, vec![[1, 1, 1, 1]]);
        let state = PlantState {
            experience_point: 0,
            ..seedling()
        };

        let (next, outcome) = apply(&state, ActivityKind::Survey, 2, &curve).unwrap();

        assert_eq!(next.level, 5);
        assert!(outcome.leveled_up);
        assert!(outcome.is_completed);
    }

    #[test]
    fn test_exp_stays_below_threshold_between_calls() {
        let curve = LevelCurve::default();
        let mut state = seedling();

        for _ in 0..200 {
            let (next, _) = apply(&state, ActivityKind::Water, 2, &curve).unwrap();
            state = next;

            let threshold = curve.threshold(2, state.level);
            if threshold != 0 {
                assert!(state.experience_point < threshold);
            }
        }

        assert_eq!(state.level, 5);
    }

    #[test]
    fn test_feeding_requires_stock() {
        let curve = LevelCurve::default();

        let err = apply(&seedling(), ActivityKind::Nutrient, 3, &curve).unwrap_err();
        assert_eq!(err, GrowthError::NutrientExhausted);
    }

    #[test]
    fn test_attendance_restocks_a_nutrient() {
        let curve = LevelCurve::default();
        let (next, _) = apply(&seedling(), ActivityKind::Attendance, 3, &curve).unwrap();

        assert_eq!(next.nutrient_count, 1);
    }

    #[test]
    fn test_feeding_arms_the_multiplier_for_the_next_grant() {
        let curve = LevelCurve::default();
        let state = PlantState {
            nutrient_count: 1,
            ..seedling()
        };

        let (fed, fed_outcome) = apply(&state, ActivityKind::Nutrient, 3, &curve).unwrap();
        assert_eq!(fed_outcome.points, 10);
        assert_eq!(fed.nutrient_count, 0);
        assert!(fed.nutrient_active);

        let (watered, water_outcome) = apply(&fed, ActivityKind::Water, 3, &curve).unwrap();
        assert_eq!(water_outcome.points, 20);
        assert!(!watered.nutrient_active);

        let (_, plain) = apply(&watered, ActivityKind::Water, 3, &curve).unwrap();
        assert_eq!(plain.points, 10);
    }
}
