// capture/windows.rs - DXGI Desktop Duplication Backend
//
// Captures the primary output through IDXGIOutputDuplication on a hardware
// D3D11 device. Only the crop rectangle is copied GPU-side into a staging
// texture sized exactly to the crop, which is then mapped for CPU read.

use std::time::Duration;

use log::{debug, info};
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BOX,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    IDXGIDevice, IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST,
    DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO,
};

use super::{AcquireOutcome, CaptureBackend, CaptureError, CaptureResult};
use crate::app::{DesktopSize, Region};
use crate::shm::PixelRows;

/// Device, context, and duplication interface for one output
struct Duplication {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
}

/// CPU-readable texture sized to the current crop
struct Staging {
    texture: ID3D11Texture2D,
    width: u32,
    height: u32,
}

/// Desktop duplication capture of the primary output
pub struct DxgiBackend {
    device: Option<Duplication>,
    staging: Option<Staging>,
}

impl Default for DxgiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DxgiBackend {
    pub fn new() -> Self {
        Self {
            device: None,
            staging: None,
        }
    }

    /// Create a hardware D3D11 device with BGRA support
    fn create_d3d_device() -> CaptureResult<(ID3D11Device, ID3D11DeviceContext)> {
        let mut device = None;
        let mut context = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .map_err(|e| CaptureError::InitFailed(format!("D3D11CreateDevice failed: {e}")))?;
        }

        match (device, context) {
            (Some(device), Some(context)) => Ok((device, context)),
            _ => Err(CaptureError::InitFailed("D3D11CreateDevice returned null".into())),
        }
    }

    /// Duplicate output 0 of the device's adapter
    fn duplicate_primary_output(device: &ID3D11Device) -> CaptureResult<(IDXGIOutputDuplication, DesktopSize)> {
        let unavailable = |what: &str, e: windows::core::Error| {
            CaptureError::DuplicationUnavailable(format!("{what}: {e}"))
        };

        let dxgi_device: IDXGIDevice = device.cast().map_err(|e| unavailable("IDXGIDevice cast", e))?;
        unsafe {
            let adapter = dxgi_device.GetAdapter().map_err(|e| unavailable("GetAdapter", e))?;
            let output = adapter.EnumOutputs(0).map_err(|e| unavailable("EnumOutputs(0)", e))?;

            let output1: IDXGIOutput1 = output.cast().map_err(|e| unavailable("IDXGIOutput1 cast", e))?;
            let duplication = output1
                .DuplicateOutput(device)
                .map_err(|e| unavailable("DuplicateOutput", e))?;

            // Mode size is the size of the acquired texture, also on rotated outputs
            let mut desc = DXGI_OUTDUPL_DESC::default();
            duplication.GetDesc(&mut desc);
            let desktop = DesktopSize {
                width: desc.ModeDesc.Width,
                height: desc.ModeDesc.Height,
            };

            Ok((duplication, desktop))
        }
    }

    fn create_staging_texture(device: &ID3D11Device, width: u32, height: u32) -> CaptureResult<ID3D11Texture2D> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture = None;
        unsafe {
            device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .map_err(|e| CaptureError::StagingFailed { width, height, reason: e.to_string() })?;
        }
        texture.ok_or_else(|| CaptureError::StagingFailed {
            width,
            height,
            reason: "CreateTexture2D returned null".into(),
        })
    }

    /// Copy the crop out of the acquired desktop texture and hand the mapped rows over
    fn copy_crop(
        dup: &Duplication,
        staging: &Staging,
        resource: &IDXGIResource,
        crop: &Region,
        on_frame: &mut dyn FnMut(PixelRows<'_>),
    ) -> CaptureResult<AcquireOutcome> {
        let source: ID3D11Texture2D = resource
            .cast()
            .map_err(|e| CaptureError::AcquireFailed(format!("desktop resource is not a texture: {e}")))?;

        // An out-of-bounds box makes CopySubresourceRegion a silent no-op
        let mut source_desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { source.GetDesc(&mut source_desc) };
        if !crop_fits(crop, source_desc.Width, source_desc.Height) {
            debug!(
                "Crop {} outside {}x{} desktop texture, frame dropped",
                crop, source_desc.Width, source_desc.Height
            );
            return Ok(AcquireOutcome::Dropped);
        }

        let src_box = D3D11_BOX {
            left: crop.left as u32,
            top: crop.top as u32,
            front: 0,
            right: crop.right as u32,
            bottom: crop.bottom as u32,
            back: 1,
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            dup.context
                .CopySubresourceRegion(&staging.texture, 0, 0, 0, 0, &source, 0, Some(&src_box));
            dup.context
                .Map(&staging.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .map_err(|e| CaptureError::AcquireFailed(format!("Map staging texture: {e}")))?;
        }

        if !mapped.pData.is_null() {
            let row_pitch = mapped.RowPitch as usize;
            let len = row_pitch * (staging.height as usize - 1) + staging.width as usize * 4;
            let data = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
            on_frame(PixelRows {
                data,
                row_pitch,
                width: staging.width,
                height: staging.height,
            });
        }

        unsafe {
            dup.context.Unmap(&staging.texture, 0);
        }
        Ok(AcquireOutcome::Delivered)
    }
}

/// Whether the crop box lies inside a `width` x `height` texture
fn crop_fits(crop: &Region, width: u32, height: u32) -> bool {
    !crop.is_empty()
        && crop.left >= 0
        && crop.top >= 0
        && crop.right as i64 <= width as i64
        && crop.bottom as i64 <= height as i64
}

/// Errors that mean the duplication must be recreated
fn is_device_lost(e: &windows::core::Error) -> bool {
    let code = e.code();
    code == DXGI_ERROR_ACCESS_LOST || code == DXGI_ERROR_DEVICE_REMOVED || code == DXGI_ERROR_DEVICE_RESET
}

impl CaptureBackend for DxgiBackend {
    fn name(&self) -> &'static str {
        "dxgi-duplication"
    }

    fn init(&mut self) -> CaptureResult<DesktopSize> {
        let (device, context) = Self::create_d3d_device()?;
        let (duplication, desktop) = Self::duplicate_primary_output(&device)?;
        if desktop.width == 0 || desktop.height == 0 {
            return Err(CaptureError::DuplicationUnavailable("primary output has no area".into()));
        }

        info!("Duplicating primary output {}x{}", desktop.width, desktop.height);
        self.device = Some(Duplication { device, context, duplication });
        Ok(desktop)
    }

    fn shutdown(&mut self) {
        self.staging = None;
        if self.device.take().is_some() {
            debug!("D3D11 device and duplication released");
        }
    }

    fn recreate_staging(&mut self, width: u32, height: u32) -> CaptureResult<()> {
        self.staging = None;
        let dup = self.device.as_ref().ok_or(CaptureError::NotInitialized)?;
        let texture = Self::create_staging_texture(&dup.device, width, height)?;
        self.staging = Some(Staging { texture, width, height });
        Ok(())
    }

    fn release_staging(&mut self) {
        self.staging = None;
    }

    fn acquire_next_frame(
        &mut self,
        timeout: Duration,
        crop: &Region,
        on_frame: &mut dyn FnMut(PixelRows<'_>),
    ) -> CaptureResult<AcquireOutcome> {
        let dup = self.device.as_ref().ok_or(CaptureError::NotInitialized)?;
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let acquired = unsafe { dup.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) };

        if let Err(e) = acquired {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(AcquireOutcome::Timeout);
            }
            if is_device_lost(&e) {
                debug!("AcquireNextFrame: {}", e);
                return Ok(AcquireOutcome::DeviceLost);
            }
            return Err(CaptureError::AcquireFailed(e.to_string()));
        }

        let outcome = match (&self.staging, &resource) {
            (Some(staging), Some(resource))
                if staging.width == crop.width() as u32 && staging.height == crop.height() as u32 =>
            {
                Self::copy_crop(dup, staging, resource, crop, on_frame)
            }
            _ => Ok(AcquireOutcome::Dropped),
        };

        // The frame is released whatever happened to the copy
        drop(resource);
        if let Err(e) = unsafe { dup.duplication.ReleaseFrame() } {
            if is_device_lost(&e) {
                return Ok(AcquireOutcome::DeviceLost);
            }
            debug!("ReleaseFrame: {}", e);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_must_fit_the_acquired_texture() {
        // Portrait output: 1080 wide, 1920 high
        assert!(crop_fits(&Region::new(0, 0, 1080, 1920), 1080, 1920));
        assert!(crop_fits(&Region::new(100, 1800, 200, 1920), 1080, 1920));
        assert!(!crop_fits(&Region::new(0, 0, 1920, 1080), 1080, 1920));
        assert!(!crop_fits(&Region::new(1000, 0, 1081, 10), 1080, 1920));
        assert!(!crop_fits(&Region::new(-1, 0, 10, 10), 1080, 1920));
        assert!(!crop_fits(&Region::new(5, 5, 5, 10), 1080, 1920));
    }
}
