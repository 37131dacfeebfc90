use crate::main_loop::LoopHandle;
use crate::outbound::Outbound;
use std::sync::Arc;
use wyrmhole_plugin::{AsyncCall, HostError, HostFunctions};
use wyrmhole_protocol::{ColonyId, Direction, MessageId};

/// The host entry points handed to every plugin on initialization.
#[derive(Debug, Clone)]
pub struct HostFunctionTable {
    outbound: Arc<Outbound>,
    loop_handle: LoopHandle,
}

impl HostFunctionTable {
    pub fn new(outbound: Arc<Outbound>, loop_handle: LoopHandle) -> Self {
        Self {
            outbound,
            loop_handle,
        }
    }

    fn send(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        direction: Direction,
        payload: &str,
    ) -> Result<(), HostError> {
        self.outbound
            .send(colony_id, msg_id, direction, payload)
            .map_err(|err| {
                tracing::error!(
                    %colony_id,
                    %msg_id,
                    direction = direction.as_str(),
                    error = %err,
                    "failed to write to extension"
                );
                HostError::from(err)
            })
    }
}

impl HostFunctions for HostFunctionTable {
    fn schedule_call(&self, call: AsyncCall) -> Result<(), HostError> {
        if self.loop_handle.exit_requested() {
            return Err(HostError::LoopClosed);
        }
        self.loop_handle.schedule_call(call);
        Ok(())
    }

    fn send_command(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: &str,
    ) -> Result<(), HostError> {
        self.send(colony_id, msg_id, Direction::Command, payload)
    }

    fn send_response(
        &self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: &str,
    ) -> Result<(), HostError> {
        self.send(colony_id, msg_id, Direction::Response, payload)
    }
}
