#[macro_use]
pub mod internal;

pub use crate::internal::common::bitmap::Bitmap;
pub use crate::internal::common::error::Unusable;
pub use crate::internal::common::index::IndexVec;

pub use crate::internal::gres::config::{
    GresConfigFlags, JobGresFlags, SelectConfig, SelectTypeFlags,
};
pub use crate::internal::gres::job::{
    GresCounter, GresJobState, JobGresIndex, JobGresList,
};
pub use crate::internal::gres::node::{GresNodeState, LinkMatrix, TopoEntry};
pub use crate::internal::gres::resources::{
    JobId, JobNodeLayout, JobResources, JobSelectInfo, McOptions, NodeId,
};
pub use crate::internal::gres::sock::{SockGres, SocketScope};

pub type Error = internal::common::error::SelectError;
pub type Result<T> = std::result::Result<T, Error>;

pub mod select {
    pub use crate::internal::select::assign::select_and_set;
    pub use crate::internal::select::filter::{
        AvailGres, NEAR_GRES_LIMIT, NodeFilterInput, remove_unusable,
    };
    pub use crate::internal::select::layout::{TaskLayout, UsedSockets, task_cnt_node};
    pub use crate::internal::select::snapshot::SelectAttempt;
}
