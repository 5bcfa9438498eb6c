//! Placed instances of objects.

use std::rc::Rc;

use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3};

use super::object::Object;
use super::registry::ObjectId;

/// Translation, axis-angle rotation and scale of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translate: Vector3<f32>,
    /// Rotation magnitude in degrees.
    pub angle: f32,
    /// Rotation axis; need not be normalized. A zero axis means no rotation.
    pub rotate: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translate: Vector3::new(0.0, 0.0, 0.0),
            angle: 0.0,
            rotate: Vector3::unit_y(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn at(translate: Vector3<f32>) -> Self {
        Self {
            translate,
            ..Self::default()
        }
    }

    /// `T * R * S`: scale first, then rotate about the axis, then translate.
    pub fn model_matrix(&self) -> Matrix4<f32> {
        let translation = Matrix4::from_translation(self.translate);
        let rotation = if self.rotate.magnitude2() > f32::EPSILON {
            Matrix4::from_axis_angle(self.rotate.normalize(), Deg(self.angle))
        } else {
            Matrix4::identity()
        };
        let scale = Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z);
        translation * rotation * scale
    }
}

/// An object placed in the scene.
#[derive(Debug)]
pub struct Entity {
    object_id: ObjectId,
    object: Rc<Object>,
    pub transform: Transform,
    model: Matrix4<f32>,
}

impl Entity {
    pub fn new(object_id: ObjectId, object: Rc<Object>, transform: Transform) -> Self {
        Self {
            object_id,
            object,
            model: transform.model_matrix(),
            transform,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn object(&self) -> &Rc<Object> {
        &self.object
    }

    /// The model matrix as of the last [`Entity::update`].
    pub fn model(&self) -> Matrix4<f32> {
        self.model
    }

    pub fn update(&mut self) {
        self.model = self.transform.model_matrix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Transform as _};

    fn assert_point(actual: Point3<f32>, expected: Point3<f32>) {
        assert!(
            (actual - expected).magnitude() < 1e-5,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_translate_rotate_scale_order() {
        let transform = Transform {
            translate: Vector3::new(1.0, 0.0, 0.0),
            angle: 90.0,
            rotate: Vector3::new(0.0, 1.0, 0.0),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let world = transform
            .model_matrix()
            .transform_point(Point3::new(0.0, 0.0, 1.0));
        assert_point(world, Point3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_axis_is_normalized() {
        let unit = Transform {
            angle: 45.0,
            rotate: Vector3::new(0.0, 0.0, 1.0),
            ..Transform::default()
        };
        let long = Transform {
            rotate: Vector3::new(0.0, 0.0, 8.0),
            ..unit
        };
        let point = Point3::new(1.0, 0.0, 0.0);
        assert_point(
            long.model_matrix().transform_point(point),
            unit.model_matrix().transform_point(point),
        );
    }

    #[test]
    fn test_zero_axis_skips_rotation() {
        let transform = Transform {
            angle: 90.0,
            rotate: Vector3::new(0.0, 0.0, 0.0),
            ..Transform::at(Vector3::new(0.0, 1.0, 0.0))
        };
        let world = transform
            .model_matrix()
            .transform_point(Point3::new(1.0, 0.0, 0.0));
        assert_point(world, Point3::new(1.0, 1.0, 0.0));
    }
}
