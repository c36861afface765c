//! Portfolio intake domain
//!
//! Pure form-engine logic: question schema and options, typed answers,
//! composite sub-forms, the file diff tracker, validation and step navigation.
//! Nothing here performs I/O.

pub mod answer;
pub mod composite;
pub mod error;
pub mod file_diff;
pub mod ids;
pub mod navigation;
pub mod options;
pub mod question;
pub mod submission;
pub mod summary;
pub mod validation;

pub use answer::{Answer, AnswerShape, Answers, FileRef};
pub use composite::{
    CompositeStores, DayBucket, EntryList, PriceGrid, RefundPatch, RefundSchedule, RefundTier,
    RemovalConfirmer, RemoveOutcome, RoomEntry, RoomList, RoomPatch, Season, SpecialEntry,
    SpecialList, SpecialPatch, FIXED_REFUND_TIERS,
};
pub use error::DomainError;
pub use file_diff::{FileDiffTracker, FileHandle, QuestionFileOps};
pub use ids::{EntryId, FileId, FileToken, PortfolioId, QuestionId, SubmissionId};
pub use navigation::{step_label, NavState, NextOutcome, StepNavigator, EMPTY_STEP_MESSAGE};
pub use options::{
    decode_options, AgreementOptions, CheckboxInputOptions, CheckboxOption, CheckboxOptions,
    CompositeKind, FieldKind, Options, OptionsShape, ResolvedField,
};
pub use question::{FormSchema, Question, QuestionType};
pub use submission::{
    CompositePayload, FileOp, IssuedFile, SavePayload, SaveReceipt, SubmissionDraft,
};
pub use summary::{summary_columns, SummaryColumn};
pub use validation::{FormValidation, FormView, StepValidation, ValidationRules};
