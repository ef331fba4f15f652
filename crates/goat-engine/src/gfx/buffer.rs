use std::fmt;

use bytemuck::Pod;

use crate::error::{GfxError, Result};
use crate::gfx::driver::{
    BufferId, BufferTarget, DataKind, DrawMode, DriverError, SharedDriver, Topology, VertexArrayId,
    VertexAttribPointer,
};

/// One interleaved attribute: `count` elements of `byte_size` bytes fed to `slot`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeBound {
    pub slot: u32,
    pub count: u32,
    pub byte_size: u32,
}

/// A vertex buffer, its vertex array and an optional static index buffer.
///
/// Layout is declared with [`add_attribute_bound`](Self::add_attribute_bound)
/// and applied together with the data in
/// [`apply_attribute_bounds`](Self::apply_attribute_bounds); stride and offsets
/// follow from the declared widths.
pub struct BufferObject {
    driver: SharedDriver,
    vao: VertexArrayId,
    vbo: BufferId,
    ebo: Option<(BufferId, u32)>,
    bounds: Vec<AttributeBound>,
    mode: DrawMode,
    kind: DataKind,
    entry_count: usize,
}

impl BufferObject {
    /// Allocates the vertex array and buffer. Indices, if any, are uploaded now
    /// and never again.
    pub fn new(
        driver: &SharedDriver,
        mode: DrawMode,
        kind: DataKind,
        indices: Option<&[u32]>,
    ) -> Result<Self> {
        let vao = driver.create_vertex_array().map_err(creation("vertex array"))?;
        let vbo = match driver.create_buffer() {
            Ok(vbo) => vbo,
            Err(e) => {
                driver.delete_vertex_array(vao);
                return Err(creation("vertex buffer")(e));
            }
        };

        let mut this = Self {
            driver: driver.clone(),
            vao,
            vbo,
            ebo: None,
            bounds: Vec::new(),
            mode,
            kind,
            entry_count: 0,
        };

        if let Some(indices) = indices.filter(|i| !i.is_empty()) {
            let ebo = driver.create_buffer().map_err(creation("index buffer"))?;
            this.ebo = Some((ebo, indices.len() as u32));
            log::debug!("creating element buffer {ebo} for vertex array {vao}");
            driver.buffer_data(
                ebo,
                BufferTarget::Index,
                bytemuck::cast_slice(indices),
                DrawMode::Static,
            )?;
            driver.element_buffer(vao, ebo)?;
        }

        Ok(this)
    }

    /// Declares an attribute of `count` elements, each `byte_size` bytes wide.
    pub fn add_attribute_bound(&mut self, slot: u32, count: u32, byte_size: u32) -> Result<()> {
        if self.bounds.iter().any(|b| b.slot == slot) {
            return Err(GfxError::DuplicateAttributeSlot { slot });
        }
        self.bounds.push(AttributeBound {
            slot,
            count,
            byte_size,
        });
        Ok(())
    }

    /// [`add_attribute_bound`](Self::add_attribute_bound) with the element
    /// size of this buffer's data kind.
    pub fn add_attribute(&mut self, slot: u32, count: u32) -> Result<()> {
        self.add_attribute_bound(slot, count, self.kind.byte_size() as u32)
    }

    /// Uploads `data` in one call and points every declared attribute into it.
    ///
    /// Calling this again re-uploads and recomputes the entry count.
    pub fn apply_attribute_bounds<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        if self.bounds.is_empty() {
            return Err(GfxError::NoAttributesRegistered);
        }

        let per_entry: usize = self.bounds.iter().map(|b| b.count as usize).sum();
        if per_entry == 0 || data.len() % per_entry != 0 {
            return Err(GfxError::MisalignedVertexData {
                elements: data.len(),
                per_entry,
            });
        }
        let stride: u32 = self.bounds.iter().map(|b| b.byte_size * b.count).sum();

        self.driver.buffer_data(
            self.vbo,
            BufferTarget::Vertex,
            bytemuck::cast_slice(data),
            self.mode,
        )?;
        self.entry_count = data.len() / per_entry;

        let mut offset = 0;
        for bound in &self.bounds {
            let pointer = VertexAttribPointer {
                location: bound.slot,
                components: bound.count,
                kind: self.kind,
                stride,
                offset,
            };
            log::debug!("vertex_attrib_pointer({}, {pointer:?})", self.vao);
            self.driver.vertex_attrib_pointer(self.vao, self.vbo, &pointer)?;
            self.driver.enable_vertex_attrib(self.vao, bound.slot)?;
            offset += bound.byte_size * bound.count;
        }

        log::info!(
            "applied {} attribute bounds to vertex array {} ({} entries, stride {stride})",
            self.bounds.len(),
            self.vao,
            self.entry_count
        );
        Ok(())
    }

    /// Binds the vertex array.
    pub fn bind(&self) -> Result<()> {
        self.driver.bind_vertex_array(self.vao)?;
        Ok(())
    }

    /// Draws triangles: over the index buffer if there is one, else over every entry.
    pub fn draw(&self) -> Result<()> {
        match self.ebo {
            Some((_, count)) => self.driver.draw_elements(Topology::Triangles, count)?,
            None => self
                .driver
                .draw_arrays(Topology::Triangles, 0, self.entry_count as u32)?,
        }
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn bounds(&self) -> &[AttributeBound] {
        &self.bounds
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vao
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vbo
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.ebo.map(|(id, _)| id)
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.mode
    }

    pub fn data_kind(&self) -> DataKind {
        self.kind
    }
}

fn creation(what: &'static str) -> impl FnOnce(DriverError) -> GfxError {
    move |e| GfxError::ResourceCreation {
        what,
        reason: e.to_string(),
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        self.driver.delete_vertex_array(self.vao);
        self.driver.delete_buffer(self.vbo);
        if let Some((ebo, _)) = self.ebo {
            self.driver.delete_buffer(ebo);
        }
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("vao", &self.vao)
            .field("vbo", &self.vbo)
            .field("ebo", &self.ebo)
            .field("bounds", &self.bounds)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}
