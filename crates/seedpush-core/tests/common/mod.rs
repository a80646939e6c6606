#![allow(dead_code)]

pub mod rpc_server;
