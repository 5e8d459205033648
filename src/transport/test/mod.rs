
mod state_send;
