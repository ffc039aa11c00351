use crate::Result;
use crate::selector::SelectedClip;

pub trait ClipEncoder {
    fn write_clip(&mut self, clip: &SelectedClip) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
