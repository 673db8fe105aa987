// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simple helpers for acquiring a wgpu device.

use wgpu::{Adapter, Device, Instance, Queue};

use crate::{Error, Result};

/// An adapter together with the device and queue created from it.
#[derive(Debug)]
pub struct DeviceHandle {
    adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl DeviceHandle {
    /// Returns the adapter associated with the device.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn into_parts(self) -> (Adapter, Device, Queue) {
        (self.adapter, self.device, self.queue)
    }
}

/// Requests a device with no special features, preferring a discrete GPU.
pub async fn request_device(instance: &Instance) -> Result<DeviceHandle> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await
        .ok_or(Error::NoCompatibleDevice)?;
    let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vellum device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await?;
    log::debug!("Using adapter {:?}", adapter.get_info());
    Ok(DeviceHandle {
        adapter,
        device,
        queue,
    })
}

/// Blocks on [`request_device`] with a default instance.
pub fn create_headless_device() -> Result<DeviceHandle> {
    let instance = Instance::default();
    pollster::block_on(request_device(&instance))
}
