#![cfg_attr(not(test), no_std)]

pub mod filter;
pub mod lerp;
