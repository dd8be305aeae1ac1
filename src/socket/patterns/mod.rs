//! Helper structures shared by the socket pattern implementations.

pub(crate) mod dist;
pub(crate) mod fair_queue;
pub(crate) mod load_balancer;
pub(crate) mod mtrie;

pub(crate) use dist::Distributor;
pub(crate) use fair_queue::FairQueue;
pub(crate) use load_balancer::{LbError, LoadBalancer};
pub(crate) use mtrie::Mtrie;
