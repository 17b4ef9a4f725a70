// ABOUTME: Shared helpers for the vbox binary: logging setup and table rendering
// ABOUTME: Kept in a library target so the formatting rules are unit tested

pub mod logging;
pub mod output;
