/// Creates a transform trait for the elements of one kind of model, together with its closure adapter and its
/// pipeline.
///
/// The trait gets implementations for `&mut T` and `Box<T>`. The pipeline runs each element through the first stage
/// into a buffer, runs that buffer through the next stage, and so on. The output of the last stage goes into the
/// builder the pipeline was given.
macro_rules! make_transform {
	(
		$( #[$transform_doc:meta] )*
		$transform:ident for $element:ident into $builder:ident;
		$( #[$adapter_doc:meta] )*
		$adapter_fn:ident -> $adapter:ident;
		$( #[$pipeline_doc:meta] )*
		$pipeline:ident;
	) => {
		$( #[$transform_doc] )*
		pub trait $transform {
			/// Handles one element. What gets passed on to `builder` is the output.
			fn accept<'r>(&mut self, builder: &mut $builder<'_, 'r>, element: $element<'r>) -> Result<()>;

			/// Called after the last element.
			fn at_end<'r>(&mut self, builder: &mut $builder<'_, 'r>) -> Result<()> {
				let _ = builder;
				Ok(())
			}

			/// Runs the output of this transform through `next`.
			fn and_then(self, next: impl $transform + 'static) -> $pipeline where Self: Sized + 'static {
				$pipeline { stages: vec![Box::new(self), Box::new(next)] }
			}
		}

		impl<T: $transform + ?Sized> $transform for &mut T {
			fn accept<'r>(&mut self, builder: &mut $builder<'_, 'r>, element: $element<'r>) -> Result<()> {
				(**self).accept(builder, element)
			}

			fn at_end<'r>(&mut self, builder: &mut $builder<'_, 'r>) -> Result<()> {
				(**self).at_end(builder)
			}
		}

		impl<T: $transform + ?Sized> $transform for Box<T> {
			fn accept<'r>(&mut self, builder: &mut $builder<'_, 'r>, element: $element<'r>) -> Result<()> {
				(**self).accept(builder, element)
			}

			fn at_end<'r>(&mut self, builder: &mut $builder<'_, 'r>) -> Result<()> {
				(**self).at_end(builder)
			}
		}

		$( #[$adapter_doc] )*
		pub struct $adapter<F>(F);

		#[doc = concat!("Makes a [`", stringify!($transform), "`] out of a closure.")]
		pub fn $adapter_fn<F>(f: F) -> $adapter<F>
		where
			F: for<'b, 'r> FnMut(&mut $builder<'b, 'r>, $element<'r>) -> Result<()>,
		{
			$adapter(f)
		}

		impl<F> $transform for $adapter<F>
		where
			F: for<'b, 'r> FnMut(&mut $builder<'b, 'r>, $element<'r>) -> Result<()>,
		{
			fn accept<'r>(&mut self, builder: &mut $builder<'_, 'r>, element: $element<'r>) -> Result<()> {
				(self.0)(builder, element)
			}
		}

		$( #[$pipeline_doc] )*
		pub struct $pipeline {
			stages: Vec<Box<dyn $transform>>,
		}

		impl $pipeline {
			fn run<'r>(
				stages: &mut [Box<dyn $transform>],
				builder: &mut $builder<'_, 'r>,
				input: Vec<$element<'r>>,
			) -> Result<()> {
				let Some((stage, rest)) = stages.split_first_mut() else {
					for element in input {
						builder.with(element);
					}
					return Ok(());
				};
				let mut buffer = Vec::new();
				let mut staged = builder.stage(&mut buffer);
				for element in input {
					stage.accept(&mut staged, element)?;
				}
				Self::run(rest, builder, buffer)
			}
		}

		impl $transform for $pipeline {
			fn accept<'r>(&mut self, builder: &mut $builder<'_, 'r>, element: $element<'r>) -> Result<()> {
				Self::run(&mut self.stages, builder, vec![element])
			}

			fn at_end<'r>(&mut self, builder: &mut $builder<'_, 'r>) -> Result<()> {
				for i in 0..self.stages.len() {
					let Some((stage, rest)) = self.stages[i..].split_first_mut() else { break };
					let mut buffer = Vec::new();
					stage.at_end(&mut builder.stage(&mut buffer))?;
					Self::run(rest, builder, buffer)?;
				}
				Ok(())
			}

			fn and_then(mut self, next: impl $transform + 'static) -> $pipeline {
				self.stages.push(Box::new(next));
				self
			}
		}
	}
}
