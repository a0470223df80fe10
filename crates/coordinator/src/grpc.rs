//! gRPC service/client glue for the DDL coordinator.
//!
//! RPC schema source: `proto/odl_coordinator.proto`.
//!
//! Key RPCs (generated under [`v1`]):
//! - `DdlHeartbeat` — worker pull endpoint
//! - `SubmitDdl`, `QueryDdl`, `SuspendDdl`, `ResumeDdl` — admin endpoint
//!
//! Useful generated request/response types:
//! [`v1::DdlHeartbeatRequest`], [`v1::SubmitDdlRequest`],
//! [`v1::QueryDdlRequest`], [`v1::SuspendDdlRequest`].

use std::sync::Arc;

use odl_common::{IndexId, OdlError, RegionId, TableId};
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::backfill::DdlControlPlane;
use crate::coordinator::DdlCoordinator;
use crate::heartbeat::{
    BroadcastAck as CoreBroadcastAck, HeartbeatRequest as CoreHeartbeatRequest,
    HeartbeatResponse as CoreHeartbeatResponse,
};
use crate::job::{
    DdlJob as CoreDdlJob, DdlOp as CoreDdlOp, IndexState as CoreIndexState,
    JobErrCode as CoreJobErrCode, RegionWork as CoreRegionWork, WorkStatus as CoreWorkStatus,
};

#[allow(missing_docs)]
pub mod v1 {
    tonic::include_proto!("odl.coordinator.v1");
}

pub use v1::ddl_admin_client::DdlAdminClient;
pub use v1::ddl_admin_server::{DdlAdmin, DdlAdminServer};
pub use v1::ddl_heartbeat_client::DdlHeartbeatClient;
pub use v1::ddl_heartbeat_server::{DdlHeartbeat, DdlHeartbeatServer};

/// Combined gRPC service implementation backed by a shared [`DdlCoordinator`].
#[derive(Clone)]
pub struct CoordinatorServices {
    coordinator: Arc<Mutex<DdlCoordinator>>,
}

impl CoordinatorServices {
    /// Build services from an owned coordinator instance.
    pub fn new(coordinator: DdlCoordinator) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
        }
    }

    /// Build services from shared coordinator state.
    pub fn from_shared(coordinator: Arc<Mutex<DdlCoordinator>>) -> Self {
        Self { coordinator }
    }

    /// Access shared coordinator state.
    pub fn coordinator(&self) -> Arc<Mutex<DdlCoordinator>> {
        Arc::clone(&self.coordinator)
    }
}

#[tonic::async_trait]
impl DdlHeartbeat for CoordinatorServices {
    async fn ddl_heartbeat(
        &self,
        request: Request<v1::DdlHeartbeatRequest>,
    ) -> Result<Response<v1::DdlHeartbeatResponse>, Status> {
        let req = core_heartbeat_request(request.into_inner())?;
        let mut coordinator = self.coordinator.lock().await;
        let resp = coordinator.on_heartbeat(req).map_err(to_status)?;
        Ok(Response::new(proto_heartbeat_response(resp)))
    }
}

#[tonic::async_trait]
impl DdlAdmin for CoordinatorServices {
    async fn submit_ddl(
        &self,
        request: Request<v1::SubmitDdlRequest>,
    ) -> Result<Response<v1::SubmitDdlResponse>, Status> {
        let req = request.into_inner();
        let table_id = TableId(req.table_id);
        let index_id = IndexId(req.index_id);
        let mut coordinator = self.coordinator.lock().await;
        match core_ddl_op(req.op)? {
            CoreDdlOp::AddGlobalIndex => coordinator
                .submit_add_index(table_id, index_id)
                .map_err(to_status)?,
            CoreDdlOp::DropGlobalIndex => coordinator
                .submit_drop_index(table_id, index_id)
                .map_err(to_status)?,
        }
        Ok(Response::new(v1::SubmitDdlResponse {}))
    }

    async fn query_ddl(
        &self,
        request: Request<v1::QueryDdlRequest>,
    ) -> Result<Response<v1::QueryDdlResponse>, Status> {
        let req = request.into_inner();
        let table_id = TableId(req.table_id);
        let coordinator = self.coordinator.lock().await;
        let job = coordinator
            .job(table_id)
            .ok_or_else(|| Status::not_found(format!("no ddl job for table {table_id}")))?;
        let region_works = coordinator
            .region_works(table_id)
            .into_iter()
            .map(proto_region_work)
            .collect();
        Ok(Response::new(v1::QueryDdlResponse {
            job: Some(proto_ddl_job(job)),
            region_works,
        }))
    }

    async fn suspend_ddl(
        &self,
        request: Request<v1::SuspendDdlRequest>,
    ) -> Result<Response<v1::SuspendDdlResponse>, Status> {
        let req = request.into_inner();
        let mut coordinator = self.coordinator.lock().await;
        coordinator
            .suspend(TableId(req.table_id))
            .map_err(to_status)?;
        Ok(Response::new(v1::SuspendDdlResponse {}))
    }

    async fn resume_ddl(
        &self,
        request: Request<v1::ResumeDdlRequest>,
    ) -> Result<Response<v1::ResumeDdlResponse>, Status> {
        let req = request.into_inner();
        let mut coordinator = self.coordinator.lock().await;
        coordinator
            .resume(TableId(req.table_id))
            .map_err(to_status)?;
        Ok(Response::new(v1::ResumeDdlResponse {}))
    }
}

/// gRPC-based control-plane adapter for workers embedded in remote
/// processes.
#[derive(Debug)]
pub struct GrpcControlPlane {
    heartbeat: Mutex<DdlHeartbeatClient<tonic::transport::Channel>>,
}

impl GrpcControlPlane {
    /// Connect the heartbeat client to a coordinator endpoint.
    pub async fn connect(endpoint: &str) -> odl_common::Result<Self> {
        let heartbeat = DdlHeartbeatClient::connect(endpoint.to_string())
            .await
            .map_err(|e| OdlError::InvalidConfig(format!("coordinator connect failed: {e}")))?;
        Ok(Self {
            heartbeat: Mutex::new(heartbeat),
        })
    }
}

#[async_trait::async_trait]
impl DdlControlPlane for GrpcControlPlane {
    async fn ddl_heartbeat(
        &self,
        request: CoreHeartbeatRequest,
    ) -> odl_common::Result<CoreHeartbeatResponse> {
        let mut client = self.heartbeat.lock().await;
        let response = client
            .ddl_heartbeat(proto_heartbeat_request(request))
            .await
            .map_err(|e| OdlError::Schedule(format!("heartbeat rpc failed: {e}")))?
            .into_inner();
        core_heartbeat_response(response)
    }
}

fn proto_work_status(status: CoreWorkStatus) -> v1::WorkStatus {
    match status {
        CoreWorkStatus::Idle => v1::WorkStatus::Idle,
        CoreWorkStatus::Doing => v1::WorkStatus::Doing,
        CoreWorkStatus::Done => v1::WorkStatus::Done,
        CoreWorkStatus::Fail => v1::WorkStatus::Fail,
        CoreWorkStatus::DupUniq => v1::WorkStatus::DupUniq,
        CoreWorkStatus::Error => v1::WorkStatus::Error,
    }
}

fn core_work_status(status: i32) -> Result<CoreWorkStatus, Status> {
    let parsed = v1::WorkStatus::try_from(status)
        .map_err(|_| Status::invalid_argument(format!("invalid work status value: {status}")))?;
    match parsed {
        v1::WorkStatus::Idle => Ok(CoreWorkStatus::Idle),
        v1::WorkStatus::Doing => Ok(CoreWorkStatus::Doing),
        v1::WorkStatus::Done => Ok(CoreWorkStatus::Done),
        v1::WorkStatus::Fail => Ok(CoreWorkStatus::Fail),
        v1::WorkStatus::DupUniq => Ok(CoreWorkStatus::DupUniq),
        v1::WorkStatus::Error => Ok(CoreWorkStatus::Error),
        v1::WorkStatus::Unspecified => Err(Status::invalid_argument("work status unspecified")),
    }
}

fn proto_index_state(state: CoreIndexState) -> v1::IndexState {
    match state {
        CoreIndexState::None => v1::IndexState::None,
        CoreIndexState::DeleteOnly => v1::IndexState::DeleteOnly,
        CoreIndexState::WriteOnly => v1::IndexState::WriteOnly,
        CoreIndexState::WriteLocal => v1::IndexState::WriteLocal,
        CoreIndexState::Public => v1::IndexState::Public,
    }
}

fn core_index_state(state: i32) -> Result<CoreIndexState, Status> {
    let parsed = v1::IndexState::try_from(state)
        .map_err(|_| Status::invalid_argument(format!("invalid index state value: {state}")))?;
    match parsed {
        v1::IndexState::None => Ok(CoreIndexState::None),
        v1::IndexState::DeleteOnly => Ok(CoreIndexState::DeleteOnly),
        v1::IndexState::WriteOnly => Ok(CoreIndexState::WriteOnly),
        v1::IndexState::WriteLocal => Ok(CoreIndexState::WriteLocal),
        v1::IndexState::Public => Ok(CoreIndexState::Public),
        v1::IndexState::Unspecified => Err(Status::invalid_argument("index state unspecified")),
    }
}

fn proto_ddl_op(op: CoreDdlOp) -> v1::DdlOp {
    match op {
        CoreDdlOp::AddGlobalIndex => v1::DdlOp::AddGlobalIndex,
        CoreDdlOp::DropGlobalIndex => v1::DdlOp::DropGlobalIndex,
    }
}

fn core_ddl_op(op: i32) -> Result<CoreDdlOp, Status> {
    let parsed = v1::DdlOp::try_from(op)
        .map_err(|_| Status::invalid_argument(format!("invalid ddl op value: {op}")))?;
    match parsed {
        v1::DdlOp::AddGlobalIndex => Ok(CoreDdlOp::AddGlobalIndex),
        v1::DdlOp::DropGlobalIndex => Ok(CoreDdlOp::DropGlobalIndex),
        v1::DdlOp::Unspecified => Err(Status::invalid_argument("ddl op unspecified")),
    }
}

fn proto_errcode(errcode: CoreJobErrCode) -> v1::ErrCode {
    match errcode {
        CoreJobErrCode::InProcess => v1::ErrCode::InProcess,
        CoreJobErrCode::Success => v1::ErrCode::Success,
        CoreJobErrCode::ExecFail => v1::ErrCode::ExecFail,
    }
}

fn core_errcode(errcode: i32) -> Result<CoreJobErrCode, Status> {
    let parsed = v1::ErrCode::try_from(errcode)
        .map_err(|_| Status::invalid_argument(format!("invalid errcode value: {errcode}")))?;
    match parsed {
        v1::ErrCode::InProcess => Ok(CoreJobErrCode::InProcess),
        v1::ErrCode::Success => Ok(CoreJobErrCode::Success),
        v1::ErrCode::ExecFail => Ok(CoreJobErrCode::ExecFail),
        v1::ErrCode::Unspecified => Err(Status::invalid_argument("errcode unspecified")),
    }
}

fn proto_region_work(work: CoreRegionWork) -> v1::RegionWork {
    v1::RegionWork {
        table_id: work.table_id.0,
        region_id: work.region_id.0,
        index_id: work.index_id.0,
        partition: work.partition,
        start_key: work.start_key,
        end_key: work.end_key,
        status: proto_work_status(work.status) as i32,
        retry_time: work.retry_time,
        address: work.address,
    }
}

fn core_region_work(work: v1::RegionWork) -> Result<CoreRegionWork, Status> {
    Ok(CoreRegionWork {
        table_id: TableId(work.table_id),
        region_id: RegionId(work.region_id),
        index_id: IndexId(work.index_id),
        partition: work.partition,
        start_key: work.start_key,
        end_key: work.end_key,
        status: core_work_status(work.status)?,
        retry_time: work.retry_time,
        address: work.address,
    })
}

fn proto_ddl_job(job: CoreDdlJob) -> v1::DdlJob {
    v1::DdlJob {
        table_id: job.table_id.0,
        op: proto_ddl_op(job.op) as i32,
        index_id: job.index_id.0,
        job_state: proto_index_state(job.job_state) as i32,
        errcode: proto_errcode(job.errcode) as i32,
        suspended: job.suspended,
        deleted: job.deleted,
    }
}

fn core_ddl_job(job: v1::DdlJob) -> Result<CoreDdlJob, Status> {
    Ok(CoreDdlJob {
        table_id: TableId(job.table_id),
        op: core_ddl_op(job.op)?,
        index_id: IndexId(job.index_id),
        job_state: core_index_state(job.job_state)?,
        errcode: core_errcode(job.errcode)?,
        suspended: job.suspended,
        deleted: job.deleted,
    })
}

fn core_heartbeat_request(req: v1::DdlHeartbeatRequest) -> Result<CoreHeartbeatRequest, Status> {
    Ok(CoreHeartbeatRequest {
        address: req.address,
        physical_room: req.physical_room,
        can_do_ddl: req.can_do_ddl,
        region_works: req
            .region_works
            .into_iter()
            .map(core_region_work)
            .collect::<Result<Vec<_>, Status>>()?,
        broadcast_acks: req
            .broadcast_acks
            .into_iter()
            .map(|ack| {
                Ok(CoreBroadcastAck {
                    table_id: TableId(ack.table_id),
                    status: core_work_status(ack.status)?,
                })
            })
            .collect::<Result<Vec<_>, Status>>()?,
    })
}

fn proto_heartbeat_request(req: CoreHeartbeatRequest) -> v1::DdlHeartbeatRequest {
    v1::DdlHeartbeatRequest {
        address: req.address,
        physical_room: req.physical_room,
        can_do_ddl: req.can_do_ddl,
        region_works: req.region_works.into_iter().map(proto_region_work).collect(),
        broadcast_acks: req
            .broadcast_acks
            .into_iter()
            .map(|ack| v1::BroadcastAck {
                table_id: ack.table_id.0,
                status: proto_work_status(ack.status) as i32,
            })
            .collect(),
    }
}

fn proto_heartbeat_response(resp: CoreHeartbeatResponse) -> v1::DdlHeartbeatResponse {
    v1::DdlHeartbeatResponse {
        assignments: resp.assignments.into_iter().map(proto_region_work).collect(),
        broadcasts: resp.broadcasts.into_iter().map(proto_ddl_job).collect(),
    }
}

fn core_heartbeat_response(
    resp: v1::DdlHeartbeatResponse,
) -> odl_common::Result<CoreHeartbeatResponse> {
    let assignments = resp
        .assignments
        .into_iter()
        .map(core_region_work)
        .collect::<Result<Vec<_>, Status>>()
        .map_err(|e| OdlError::Schedule(format!("bad assignment payload: {e}")))?;
    let broadcasts = resp
        .broadcasts
        .into_iter()
        .map(core_ddl_job)
        .collect::<Result<Vec<_>, Status>>()
        .map_err(|e| OdlError::Schedule(format!("bad broadcast payload: {e}")))?;
    Ok(CoreHeartbeatResponse {
        assignments,
        broadcasts,
    })
}

fn to_status(err: OdlError) -> Status {
    match err {
        OdlError::InvalidConfig(msg) => Status::invalid_argument(msg),
        OdlError::Catalog(msg) => Status::failed_precondition(msg),
        OdlError::Schedule(msg) => Status::failed_precondition(msg),
        OdlError::Persistence(msg) => Status::internal(msg),
        OdlError::Io(e) => Status::internal(e.to_string()),
        OdlError::Unsupported(msg) => Status::unimplemented(msg),
    }
}
