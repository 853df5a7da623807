//! The five scan layers. Each appends its findings in node-id order.

pub(crate) mod contextual;
pub(crate) mod lexical;
pub(crate) mod numerical;
pub(crate) mod reasoning;
pub(crate) mod structural;
