//! LLM Gateway (C2): the single point through which every cognitive
//! component (BDI, AGInt, Mastermind, SIW) talks to a language model.

pub mod gateway;

pub use gateway::{estimate_cost, ChatMessage, GenerateRequest, GenerateResponse, Gateway, Generator};
