use crate::cursor::{ReadCursor, WriteCursor};
use crate::{PduDecode, PduEncode, PduResult};

const MONITOR_LIMIT: usize = 16;

/// 2.2.1.3.6 Client Monitor Data (TS_UD_CS_MONITOR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMonitorData {
    pub monitors: Vec<Monitor>,
}

impl ClientMonitorData {
    const NAME: &'static str = "ClientMonitorData";

    const FIXED_PART_SIZE: usize = 4 /* flags, unused */ + 4 /* monitorCount */;
}

impl PduEncode for ClientMonitorData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(0); // flags
        dst.write_u32(cast_length!("monitorCount", self.monitors.len())?);
        for monitor in &self.monitors {
            monitor.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.monitors.iter().map(PduEncode::size).sum::<usize>()
    }
}

impl<'de> PduDecode<'de> for ClientMonitorData {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _flags = src.read_u32();
        let count: usize = cast_length!("monitorCount", src.read_u32())?;

        if count > MONITOR_LIMIT {
            return Err(invalid_message_err!("monitorCount", "over the monitor limit"));
        }

        let monitors = (0..count).map(|_| Monitor::decode(src)).collect::<PduResult<Vec<_>>>()?;

        Ok(Self { monitors })
    }
}

/// TS_MONITOR_DEF: a virtual-desktop rectangle plus its flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub flags: u32,
}

impl Monitor {
    const NAME: &'static str = "Monitor";

    const FIXED_PART_SIZE: usize = 4 * 5;
}

impl PduEncode for Monitor {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        for edge in [self.left, self.top, self.right, self.bottom] {
            dst.write_u32(edge as u32);
        }
        dst.write_u32(self.flags);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> PduDecode<'de> for Monitor {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            left: src.read_u32() as i32,
            top: src.read_u32() as i32,
            right: src.read_u32() as i32,
            bottom: src.read_u32() as i32,
            flags: src.read_u32(),
        })
    }
}
