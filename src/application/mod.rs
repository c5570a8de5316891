pub mod use_cases;

pub use use_cases::history_gateway::{HistoryGateway, HistoryListing};
pub use use_cases::relay_executor::RelayExecutor;
pub use use_cases::submit_relay::{RelayResult, SubmitRelayRequest, SubmitRelayUseCase};
