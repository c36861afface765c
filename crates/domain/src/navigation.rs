//! Step navigation state machine
//!
//! `Loading` until the schema arrives, then `AtStep(n)` over the sparse set
//! of steps present in the schema. Forward moves are gated by step
//! validation in edit mode; backward moves never are.

use crate::error::DomainError;
use crate::question::FormSchema;
use crate::validation::StepValidation;

pub const INSTRUCTIONS_LABEL: &str = "안내사항";
pub const EMPTY_STEP_MESSAGE: &str = "이 단계에는 질문이 없습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavState {
    #[default]
    Loading,
    AtStep(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced { from: i32, to: i32 },
    /// Validation failed; the current step is kept
    Blocked(StepValidation),
    /// Already at the last step
    Stayed(i32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepNavigator {
    state: NavState,
}

impl StepNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn current_step(&self) -> Option<i32> {
        match self.state {
            NavState::Loading => None,
            NavState::AtStep(step) => Some(step),
        }
    }

    /// Enter the first step the first time a non-empty schema is seen.
    ///
    /// Returns true only on that transition; later refreshes keep the step.
    pub fn on_schema_loaded(&mut self, schema: &FormSchema) -> bool {
        match (self.state, schema.min_step()) {
            (NavState::Loading, Some(min)) => {
                self.state = NavState::AtStep(min);
                true
            }
            _ => false,
        }
    }

    fn at(&self, action: &str) -> Result<i32, DomainError> {
        self.current_step().ok_or_else(|| {
            DomainError::invalid_state_transition(format!("cannot {action} while loading"))
        })
    }

    /// Move forward. In edit mode `validate` runs for the current step first;
    /// in read-only mode it is never called.
    pub fn next(
        &mut self,
        schema: &FormSchema,
        read_only: bool,
        validate: impl FnOnce(i32) -> StepValidation,
    ) -> Result<NextOutcome, DomainError> {
        let current = self.at("advance")?;
        if !read_only {
            let result = validate(current);
            if !result.valid {
                return Ok(NextOutcome::Blocked(result));
            }
        }
        Ok(match schema.next_step_after(current) {
            Some(to) => {
                self.state = NavState::AtStep(to);
                NextOutcome::Advanced { from: current, to }
            }
            None => NextOutcome::Stayed(current),
        })
    }

    /// Move back one present step. Returns the step now shown.
    pub fn previous(&mut self, schema: &FormSchema) -> Result<i32, DomainError> {
        let current = self.at("go back")?;
        let target = schema.previous_step_before(current).unwrap_or(current);
        self.state = NavState::AtStep(target);
        Ok(target)
    }

    /// Jump to a step, used to send the user back to an incomplete step.
    ///
    /// In edit mode only steps at or before the current one are reachable.
    pub fn go_to(
        &mut self,
        schema: &FormSchema,
        step: i32,
        read_only: bool,
    ) -> Result<i32, DomainError> {
        let current = self.at("jump")?;
        if !schema.steps().contains(&step) {
            return Err(DomainError::not_found("Step", step.to_string()));
        }
        if !read_only && step > current {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot skip ahead from step {current} to {step}"
            )));
        }
        self.state = NavState::AtStep(step);
        Ok(step)
    }

    pub fn is_first(&self, schema: &FormSchema) -> bool {
        self.current_step().is_some() && self.current_step() == schema.min_step()
    }

    pub fn is_last(&self, schema: &FormSchema) -> bool {
        self.current_step().is_some() && self.current_step() == schema.max_step()
    }

    /// `(current - min + 1) / (max - min + 1)`, in `0.0..=1.0`.
    pub fn progress(&self, schema: &FormSchema) -> Option<f64> {
        let current = f64::from(self.current_step()?);
        let (min, max) = (f64::from(schema.min_step()?), f64::from(schema.max_step()?));
        // Step numbers may span the whole i32 range.
        let span = max - min + 1.0;
        Some(((current - min + 1.0) / span).clamp(0.0, 1.0))
    }
}

pub fn step_label(step: i32) -> String {
    if step == 0 {
        INSTRUCTIONS_LABEL.to_string()
    } else {
        format!("단계 {step}")
    }
}
