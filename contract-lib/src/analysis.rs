pub mod interval_analysis;
pub mod reentrancy_analysis;

#[cfg(test)]
mod interval_analysis_tests;
