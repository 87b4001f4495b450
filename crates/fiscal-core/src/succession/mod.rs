pub mod dmtg;

pub use dmtg::{
    compute_990i, compute_dmtg_consumption_ratio, compute_succession, compute_transmission,
    should_show_dmtg_disclaimer, Params990I, TransmissionInput, TransmissionResult,
};
