//! Scenario-based tests for ticketpipe

mod helpers;

mod orchestration;
mod pipe_flow;
mod plugins;
mod ticket_flow;
