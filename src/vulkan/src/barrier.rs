use std::time::Duration;

use anyhow::anyhow;
use ash::vk;
use derivative::Derivative;
use log::trace;
use monitor::{Barrier, BarrierError};

/// Waits for everything submitted to a queue by signaling a fence
/// behind it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct QueueBarrier {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    queue: vk::Queue,
}

impl QueueBarrier {
    pub(crate) fn new(device: ash::Device, queue: vk::Queue) -> Self {
        QueueBarrier { device, queue }
    }

    unsafe fn submit_and_wait(&self, fence: vk::Fence, timeout: Duration) ->
        Result<(), BarrierError>
    {
        self.device.queue_submit(self.queue, &[], fence)
            .map_err(|e| BarrierError::Failed(anyhow!("queue submit: {}", e)))?;
        let nanos = timeout.as_nanos().min(u64::MAX as u128) as u64;
        match self.device.wait_for_fences(&[fence], true, nanos) {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(BarrierError::TimedOut(timeout)),
            Err(e) => Err(BarrierError::Failed(anyhow!("fence wait: {}", e))),
        }
    }
}

impl Barrier for QueueBarrier {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError> {
        trace!("QueueBarrier::flush({:?})", timeout);
        unsafe {
            let fence = self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| {
                    BarrierError::Failed(anyhow!("create fence: {}", e))
                })?;
            let res = self.submit_and_wait(fence, timeout);
            // A timed out fence may still be pending; the device is
            // lost to the scenario either way
            if !matches!(res, Err(BarrierError::TimedOut(_))) {
                self.device.destroy_fence(fence, None);
            }
            res
        }
    }
}
