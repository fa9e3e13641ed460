//! gNMI wire types and service stubs generated by `tonic-build` from
//! `proto/gnmi.proto`.

#![allow(clippy::all)]

tonic::include_proto!("gnmi");
