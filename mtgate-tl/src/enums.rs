//! Boxed types: each value is written with its constructor id.

use crate::types;

tl_enum!(ResPq { ResPq(types::ResPq) });

tl_enum!(PQInnerData {
    PQInnerData(types::PQInnerData),
    Dc(types::PQInnerDataDc),
    Temp(types::PQInnerDataTemp),
    TempDc(types::PQInnerDataTempDc),
});

tl_enum!(ServerDhParams {
    Fail(types::ServerDhParamsFail),
    Ok(types::ServerDhParamsOk),
});

tl_enum!(ServerDhInnerData { ServerDhInnerData(types::ServerDhInnerData) });

tl_enum!(ClientDhInnerData { ClientDhInnerData(types::ClientDhInnerData) });

tl_enum!(SetClientDhParamsAnswer {
    DhGenOk(types::DhGenOk),
    DhGenRetry(types::DhGenRetry),
    DhGenFail(types::DhGenFail),
});

tl_enum!(Pong { Pong(types::Pong) });

tl_enum!(DestroySessionRes {
    DestroySessionOk(types::DestroySessionOk),
    DestroySessionNone(types::DestroySessionNone),
});

tl_enum!(FutureSalts { FutureSalts(types::FutureSalts) });

tl_enum!(RpcDropAnswer {
    RpcAnswerUnknown(types::RpcAnswerUnknown),
    RpcAnswerDroppedRunning(types::RpcAnswerDroppedRunning),
    RpcAnswerDropped(types::RpcAnswerDropped),
});

tl_enum!(InputClientProxy { InputClientProxy(types::InputClientProxy) });
