// Services module for the newsletter engine
// Business logic layer between the HTTP handlers and the storage collaborator

pub mod aggregator;
pub mod clock;
pub mod codes;
pub mod composer;
pub mod delivery_log;
pub mod dispatcher;
pub mod email;
pub mod registry;
pub mod scheduler;

// Re-export commonly used services
pub use aggregator::ContentAggregator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::{
    summarizer_from_config, DigestComposer, EchoSummarizer, HttpSummarizer, SummarizeError,
    Summarizer,
};
pub use delivery_log::{DeliveryLogService, FailureRate};
pub use dispatcher::{BatchReport, DeliveryOutcome, DigestPreview, Dispatcher};
pub use email::{EmailError, EmailMessage, EmailService};
pub use registry::{
    LinkTarget, ReferralLinkCommand, SubscribeCommand, SubscribeOutcome, SubscriptionRegistry,
};
pub use scheduler::Scheduler;
