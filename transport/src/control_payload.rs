use bytes::Buf;
use bytes_varint::{VarIntSupport, VarIntSupportMut};

/// The piggybacked control information of an outbound packet: which inbound packets we
///  acknowledge, and which missing packets we ask the peer to resend.
///
/// This is appended to every regular outbound packet, and it is the entire payload of the
///  otherwise-empty packets the flusher emits when an ack or resend request becomes urgent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPayload {
    pub acks: Vec<u32>,
    pub resend_requests: Vec<u32>,
}

impl ControlPayload {
    pub fn is_empty(&self) -> bool {
        self.acks.is_empty() && self.resend_requests.is_empty()
    }

    pub fn ser(&self, buf: &mut impl bytes::BufMut) {
        buf.put_usize_varint(self.acks.len());
        for &seq in &self.acks {
            buf.put_u32_varint(seq);
        }
        buf.put_usize_varint(self.resend_requests.len());
        for &seq in &self.resend_requests {
            buf.put_u32_varint(seq);
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<ControlPayload> {
        let num_acks = buf.try_get_usize_varint()?;
        let mut acks = Vec::with_capacity(num_acks.min(1024));
        for _ in 0..num_acks {
            acks.push(buf.try_get_u32_varint()?);
        }

        let num_resend_requests = buf.try_get_usize_varint()?;
        let mut resend_requests = Vec::with_capacity(num_resend_requests.min(1024));
        for _ in 0..num_resend_requests {
            resend_requests.push(buf.try_get_u32_varint()?);
        }

        Ok(ControlPayload {
            acks,
            resend_requests,
        })
    }
}
